//! Storage key constants.

/// Keys written to the token store.
pub struct StorageKeys;

impl StorageKeys {
    /// Session credential (auth provider ID token)
    pub const TOKEN: &'static str = "token";

    /// Remote user identifier
    pub const USER_ID: &'static str = "userId";

    /// "true" once the provider reported the email as verified
    pub const VERIFIED_FLAG: &'static str = "verifiedFlag";

    /// Theme preference ("light" / "dark"); survives logout
    pub const THEME_MODE: &'static str = "themeMode";

    /// When the token was issued (RFC 3339)
    pub const TOKEN_ISSUED_AT: &'static str = "tokenIssuedAt";

    /// When the token expires (RFC 3339)
    pub const TOKEN_EXPIRES_AT: &'static str = "tokenExpiresAt";

    /// Account email
    pub const EMAIL: &'static str = "email";

    /// Every key cleared on logout. `THEME_MODE` is deliberately absent.
    pub const SESSION_KEYS: [&'static str; 6] = [
        Self::TOKEN,
        Self::USER_ID,
        Self::VERIFIED_FLAG,
        Self::TOKEN_ISSUED_AT,
        Self::TOKEN_EXPIRES_AT,
        Self::EMAIL,
    ];

    /// All known keys.
    pub const ALL: [&'static str; 7] = [
        Self::TOKEN,
        Self::USER_ID,
        Self::VERIFIED_FLAG,
        Self::THEME_MODE,
        Self::TOKEN_ISSUED_AT,
        Self::TOKEN_EXPIRES_AT,
        Self::EMAIL,
    ];
}
