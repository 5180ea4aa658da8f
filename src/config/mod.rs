//! Process-wide configuration.
//!
//! Assembled once in `main` from CLI flags and handed to the app by
//! reference; nothing mutates it afterwards.

use std::fmt;
use std::path::PathBuf;

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;

/// Log verbosity accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Err,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Err => "err",
        };
        write!(f, "{}", name)
    }
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Err => LevelFilter::ERROR,
        }
    }
}

/// Immutable runtime configuration.
#[derive(Clone)]
pub struct Config {
    pub token: String,
    pub pool_url: String,
    pub log_level: LogLevel,
    pub log_path: PathBuf,
    pub miner_path: PathBuf,
    pub boost_factor: u32,
    pub iterations: u64,
    pub devices: Vec<u32>,
}

// The auth token must never reach the logs.
impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Config{{url: {}, level: {}, token: NOT_PRINTED, miner: {}, \
             boost_factor: {}, iterations: {}, devices: {:?}}}",
            self.pool_url,
            self.log_level,
            self.miner_path.display(),
            self.boost_factor,
            self.iterations,
            self.devices,
        )
    }
}

// ─── Device range grammar ────────────────────────────────────────────
//
// `[0-2,4,7-9]` selects devices 0,1,2,4,7,8,9; `[0,3]` selects 0 and 3;
// `[1]` selects 1. Ranges are inclusive, duplicates collapse to the first
// occurrence.

/// Parse a `--gpu-range` argument into an ordered device list.
pub fn parse_gpu_range(raw: &str) -> Result<Vec<u32>, String> {
    if raw.is_empty() {
        return Err("empty device range".into());
    }
    let inner = raw
        .strip_prefix('[')
        .ok_or_else(|| format!("device range must start with '[', got {:?}", raw))?;
    let inner = inner
        .strip_suffix(']')
        .ok_or_else(|| format!("device range must end with ']', got {:?}", raw))?;

    let mut devices: Vec<u32> = Vec::new();
    for item in inner.split(',') {
        if let Ok(n) = item.parse::<u32>() {
            devices.push(n);
            continue;
        }

        let (left, right) = item
            .split_once('-')
            .ok_or_else(|| format!("{:?} is neither a device number nor a range", item))?;
        if left.is_empty() {
            return Err(format!("range start is missing or negative in {:?}", item));
        }
        let lo: u32 = left
            .parse()
            .map_err(|_| format!("can't parse {:?} as a device number", left))?;
        let hi: u32 = right
            .parse()
            .map_err(|_| format!("can't parse {:?} as a device number", right))?;
        if hi < lo {
            return Err(format!("descending range {}-{}", lo, hi));
        }
        devices.extend(lo..=hi);
    }

    let mut unique = Vec::with_capacity(devices.len());
    for d in devices {
        if !unique.contains(&d) {
            unique.push(d);
        }
    }
    Ok(unique)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_range() {
        assert_eq!(parse_gpu_range("[0-2]").unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_plain_list() {
        assert_eq!(parse_gpu_range("[0,3]").unwrap(), vec![0, 3]);
    }

    #[test]
    fn test_mixed() {
        assert_eq!(
            parse_gpu_range("[0-2,4,7-9]").unwrap(),
            vec![0, 1, 2, 4, 7, 8, 9]
        );
    }

    #[test]
    fn test_degenerate_range() {
        assert_eq!(parse_gpu_range("[1-1]").unwrap(), vec![1]);
    }

    #[test]
    fn test_duplicates_keep_first() {
        assert_eq!(parse_gpu_range("[3,0-3]").unwrap(), vec![3, 0, 1, 2]);
    }

    #[test]
    fn test_errors() {
        assert!(parse_gpu_range("[2-1]").is_err());
        assert!(parse_gpu_range("[]").is_err());
        assert!(parse_gpu_range("0-2").is_err());
        assert!(parse_gpu_range("[a-b]").is_err());
        assert!(parse_gpu_range("").is_err());
        assert!(parse_gpu_range("[-1]").is_err());
    }

    #[test]
    fn test_display_redacts_token() {
        let cfg = Config {
            token: "secret".into(),
            pool_url: "server.tonguys.com".into(),
            log_level: LogLevel::Debug,
            log_path: "logs".into(),
            miner_path: "pow-miner-cuda".into(),
            boost_factor: 64,
            iterations: 100,
            devices: vec![0],
        };
        let dump = cfg.to_string();
        assert!(!dump.contains("secret"));
        assert!(dump.contains("NOT_PRINTED"));
    }
}
