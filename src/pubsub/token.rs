/// Supplies the bearer token placed in `auth_token`.
///
/// Called once per negotiation, so a provider may hand out a refreshed
/// token at any time. Refreshing is up to the provider.
pub trait TokenProvider: Send + Sync {
  fn token(&self) -> Option<String>;
}

/// Always the same token.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
  pub fn new(token: impl Into<String>) -> Self {
    Self(token.into())
  }
}

impl std::fmt::Debug for StaticToken {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("StaticToken(***)")
  }
}

impl TokenProvider for StaticToken {
  fn token(&self) -> Option<String> {
    Some(self.0.clone())
  }
}

/// Never a token, for topics which do not need one.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoToken;

impl TokenProvider for NoToken {
  fn token(&self) -> Option<String> {
    None
  }
}
