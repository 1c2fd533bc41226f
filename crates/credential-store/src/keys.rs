//! Storage key constants.

/// Keys used in secure storage.
pub struct StorageKeys;

impl StorageKeys {
    /// Current token set (JSON)
    pub const TOKENS: &'static str = "otp_session_tokens";

    /// Decoded user profile claims (JSON)
    pub const USER: &'static str = "otp_session_user";

    /// All keys owned by the credential store, in clearing order.
    pub const ALL: [&'static str; 2] = [Self::TOKENS, Self::USER];
}
