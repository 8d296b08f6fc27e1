use subtle::ConstantTimeEq;

/// Client-side admin unlock. The configured code is compared verbatim with
/// what the user typed; with no code configured nothing unlocks.
#[derive(Clone)]
pub struct AdminGate {
    code: Option<String>,
}

impl AdminGate {
    pub fn new(code: Option<String>) -> Self {
        Self { code }
    }

    pub fn unlock(&self, attempt: &str) -> bool {
        match &self.code {
            Some(code) => code.as_bytes().ct_eq(attempt.as_bytes()).into(),
            None => false,
        }
    }
}
