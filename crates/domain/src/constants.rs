//! Protocol constants
//!
//! Centralized location for the fixed values the SSO front end and its
//! backends expect.

// Envelope status codes
pub const SUCCESS_STATUS: &str = "0";
pub const TERMINAL_STATUS: &str = "1";

// SSO ceremony
pub const CASTGC_COOKIE: &str = "CASTGC";
pub const LOGIN_TYPE: &str = "username_password";
pub const LOGIN_EVENT: &str = "submit";

// Default endpoints (direct, untunneled deployment)
pub const DEFAULT_SSO_BASE: &str = "https://sso.buaa.edu.cn";
pub const DEFAULT_BYKC_BASE: &str = "http://bykc.buaa.edu.cn";
pub const DEFAULT_JWXT_BASE: &str = "http://jwxt.buaa.edu.cn:8080";
pub const JWXT_PATH_ID: &str = "ieas2.1";

// BYKC session
pub const BYKC_TOKEN_PARAM: &str = "token";
pub const BYKC_AUTH_HEADER: &str = "auth_token";
pub const ENVELOPE_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

/// Base64 DER `SubjectPublicKeyInfo` of the BYKC backend key.
pub const BYKC_RSA_PUBLIC_KEY: &str = "MIGfMA0GCSqGSIb3DQEBAQUAA4GNADCBiQKBgQDlHMQ3B5GsWnCe7Nlo1YiG/YmHdlOiKOST5aRm4iaqYSvhvWmwcigoyWTM+8bv2+sf6nQBRDWTY4KmNV7DBk1eDnTIQo6ENA31k5/tYCLEXgjPbEjCK9spiyB62fCT6cqOhbamJB0lcDJRO6Vo1m3dy+fD0jbxfDVBBNtyltIsDQIDAQAB";

// Browser identity sent on every request
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/60.0.3100.0 Safari/537.36";
pub const DEFAULT_ACCEPT: &str = "*/*";

// Transport defaults
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_REDIRECTS: u32 = 10;
pub const DEFAULT_QUERY_CEILING: u32 = 17;

/// Timestamp format used by BYKC course records.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
