use std::path::PathBuf;

/// Port the daemon's HTTP API binds by default.
pub const DAEMON_HTTP_PORT: u16 = 9787;

/// Port the loopback OAuth redirect listener binds by default.
pub const AUTH_CALLBACK_PORT: u16 = 9788;

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/likelater/ (XDG standard)
    // instead of macOS Application Support for consistency
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("likelater")
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("likelater")
    }
}

pub fn config_dir() -> PathBuf {
    // On macOS and Linux, always use ~/.config/likelater/
    // (avoid macOS Application Support folder for consistency)
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("likelater")
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("likelater")
    }
}
