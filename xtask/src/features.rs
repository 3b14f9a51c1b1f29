use anyhow::Result;

/// Feature sets of `ssogate-common` that must each compile alone.
const TIERS: &[&str] = &["", "foundation", "observability", "runtime"];

/// `cargo check` every tier, then `cargo test` the runtime tier whose
/// integration tests require it.
pub fn test_feature_matrix() -> Result<()> {
    for (index, &tier) in TIERS.iter().enumerate() {
        let label = if tier.is_empty() { "no features" } else { tier };
        println!("--> [{}/{}] ssogate-common with {label}", index + 1, TIERS.len());

        let mut args = vec!["check", "-p", "ssogate-common", "--no-default-features"];
        if !tier.is_empty() {
            args.extend(["--features", tier]);
        }
        crate::cargo(&args)?;
    }

    crate::cargo(&["test", "-p", "ssogate-common", "--features", "runtime"])
}
