/// Placeholder pepper used when none is configured. Rejected outside dev mode.
pub const DEFAULT_PASSWORD_PEPPER: &str = "latchkey-default-password-pepper";

/// Placeholder token key used when none is configured. Rejected outside dev
/// mode.
pub const DEFAULT_TOKEN_KEY: &str = "latchkey-default-token-key";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;

/// Scope created when the configuration declares none.
pub const DEFAULT_SCOPE: &str = "user";

/// Searched in order when no path is given.
pub const DEFAULT_CONFIG_LOCATIONS: &[&str] =
    &["latchkey.toml", "config/latchkey.toml"];

pub const MIN_SECRET_LENGTH: usize = 32;
