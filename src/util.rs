use std::path::{Path, PathBuf};

/// Fetch `section:key` from the config, falling back to a default (with a
/// warning on stderr) when the key is missing or the wrong type.
macro_rules! tomlget_or {
    ($cfg:ident, $sec:expr, $key:expr, $conv:ident, $as:ty, $or:expr) => {
        $cfg.get($sec)
            .and_then(|sec| sec.get($key))
            .map(|val| val.$conv())
            .unwrap_or_else(|| {
                eprintln!(
                    "failed to find {}:{} in config; proceeding with default {:?}",
                    $sec, $key, $or
                );
                Some($or)
            })
            .unwrap_or_else(|| {
                eprintln!(
                    "failed to convert {}:{} to {}; proceeding with default {:?}",
                    $sec,
                    $key,
                    stringify!($as),
                    $or
                );
                $or
            }) as $as
    };
    ($cfg:ident, $sec:expr, $key:expr, as_str, $or:expr) => {
        $cfg.get($sec)
            .and_then(|sec| sec.get($key))
            .map(|val| val.as_str())
            .unwrap_or_else(|| {
                eprintln!(
                    "failed to get {}:{} in config; proceeding with default {:?}",
                    $sec, $key, $or
                );
                Some($or)
            })
            .unwrap_or_else(|| {
                eprintln!(
                    "failed to convert {}:{} to string; proceeding with default {:?}",
                    $sec, $key, $or
                );
                $or
            })
    };
}

/// Fetch `section:key` from the config, or early-return an error String
/// naming the missing piece.
macro_rules! tomlget {
    ($cfg:ident, $sec:expr, $key:expr, $conv:ident, $as:ty) => {
        $cfg.get($sec)
            .ok_or_else(|| format!("failed to get section {}", $sec))?
            .get($key)
            .ok_or_else(|| format!("failed to get key {}:{}", $sec, $key))?
            .$conv()
            .ok_or_else(|| format!("failed to convert {}:{} to {}", $sec, $key, stringify!($as)))?
            as $as
    };
    ($cfg:ident, $sec:expr, $key:expr, as_str) => {
        $cfg.get($sec)
            .ok_or_else(|| format!("failed to get section {}", $sec))?
            .get($key)
            .ok_or_else(|| format!("failed to get key {}:{}", $sec, $key))?
            .as_str()
            .ok_or_else(|| format!("failed to convert {}:{} to string", $sec, $key))?
    };
}

/// Look for `file_name` as given, then in the current directory, then next to
/// the executable.
pub fn find_file(file_name: &Path) -> Option<PathBuf> {
    if file_name.is_absolute() {
        if file_name.exists() {
            return Some(file_name.into());
        }
        return None;
    }
    if let Ok(cwd) = std::env::current_dir() {
        if cwd.join(file_name).exists() {
            return Some(cwd.join(file_name));
        }
    }
    if let Ok(exe) = std::env::current_exe() {
        if exe.parent()?.join(file_name).exists() {
            return Some(exe.parent()?.join(file_name));
        }
    }
    None
}

pub(crate) use {tomlget, tomlget_or};
