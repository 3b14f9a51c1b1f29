//! Captcha solving seam
//!
//! The SSO only occasionally issues an image challenge. Answering it is left
//! to an injected [`CaptchaSolver`]; the ceremony blocks until it returns.

use std::fs;
use std::io::{BufRead, BufReader, Stdin, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use ssogate_domain::{GateError, Result};
use tracing::info;

/// Turns a captcha image into the text the SSO expects
pub trait CaptchaSolver: Send + Sync {
    /// Blocks until an answer is available.
    fn solve(&self, captcha_id: &str, image: &[u8]) -> Result<String>;
}

impl<S: CaptchaSolver + ?Sized> CaptchaSolver for Box<S> {
    fn solve(&self, captcha_id: &str, image: &[u8]) -> Result<String> {
        (**self).solve(captcha_id, image)
    }
}

/// Solver for deployments where a challenge should never appear
#[derive(Debug, Default, Clone, Copy)]
pub struct RefuseCaptcha;

impl CaptchaSolver for RefuseCaptcha {
    fn solve(&self, captcha_id: &str, _image: &[u8]) -> Result<String> {
        Err(GateError::AuthenticationFailed(format!(
            "captcha {captcha_id} requested but no solver is configured"
        )))
    }
}

/// Human-in-the-loop solver
///
/// Writes the challenge image to `image_path`, prints a prompt, and reads one
/// line from `input` as the answer.
pub struct PromptSolver<R> {
    image_path: PathBuf,
    input: Mutex<R>,
}

impl<R: BufRead + Send> PromptSolver<R> {
    pub fn new(image_path: impl Into<PathBuf>, input: R) -> Self {
        Self { image_path: image_path.into(), input: Mutex::new(input) }
    }
}

impl PromptSolver<BufReader<Stdin>> {
    /// Prompt on the terminal, reading the answer from stdin.
    pub fn stdin(image_path: impl Into<PathBuf>) -> Self {
        Self::new(image_path, BufReader::new(std::io::stdin()))
    }
}

impl<R: BufRead + Send> CaptchaSolver for PromptSolver<R> {
    fn solve(&self, captcha_id: &str, image: &[u8]) -> Result<String> {
        fs::write(&self.image_path, image).map_err(|e| {
            GateError::Internal(format!(
                "failed to write captcha image to {}: {e}",
                self.image_path.display()
            ))
        })?;
        info!(captcha_id, path = %self.image_path.display(), "captcha image written");

        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "Input captcha ({}): ", self.image_path.display());
        let _ = stdout.flush();

        let mut input = self
            .input
            .lock()
            .map_err(|_| GateError::Internal("captcha input lock poisoned".into()))?;
        let mut answer = String::new();
        let read = input
            .read_line(&mut answer)
            .map_err(|e| GateError::Internal(format!("failed to read captcha answer: {e}")))?;
        if read == 0 {
            return Err(GateError::AuthenticationFailed(
                "captcha input closed before an answer was given".into(),
            ));
        }

        Ok(answer.trim().to_string())
    }
}
