use tracing::warn;

/// Side effect fired when the session can't be renewed and the user has to
/// sign in again. Fire-and-forget: nothing is returned to the gateway.
pub trait LoginRedirect: Send + Sync {
    fn redirect_to_login(&self);
}

impl<F> LoginRedirect for F
where
    F: Fn() + Send + Sync,
{
    fn redirect_to_login(&self) {
        self()
    }
}

/// Redirect for headless use: logs where the user should sign in.
#[derive(Debug, Clone)]
pub struct LogRedirect {
    login_url: String,
}

impl LogRedirect {
    pub fn new(login_url: impl Into<String>) -> Self {
        Self {
            login_url: login_url.into(),
        }
    }
}

impl LoginRedirect for LogRedirect {
    fn redirect_to_login(&self) {
        warn!(login_url = %self.login_url, "Session expired, sign in again");
    }
}
