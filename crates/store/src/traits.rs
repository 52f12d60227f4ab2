use anyhow::Result;

/// Implemented by storage backends to allow them to be connected from
/// configuration.
pub trait Backend: Sized + Sync + Send {
    /// The options used to connect to the backend.
    type ConnectOptions: crate::FromEnv;

    /// Connect using options loaded from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the options cannot be loaded or the connection fails.
    fn connect() -> Result<Self> {
        Self::connect_with(<Self::ConnectOptions as crate::FromEnv>::from_env()?)
    }

    /// Connect with the specified options.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    fn connect_with(options: Self::ConnectOptions) -> Result<Self>;
}

/// Trait for creating connection options from environment variables.
pub trait FromEnv: Sized {
    /// Create connection options from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    fn from_env() -> Result<Self>;
}
