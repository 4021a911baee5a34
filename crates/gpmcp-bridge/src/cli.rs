use clap::Parser;
use gpmcp_bridge_core::{BridgeConfig, BridgeError};
use std::path::{Path, PathBuf};

/// Executable launched when `--executable` is not given
pub const DEFAULT_EXECUTABLE: &str = "ai-unity-avatar";

#[derive(Parser, Debug)]
#[command(name = "gpmcp-bridge")]
#[command(
    version,
    about = "Expose a local TCP tool server over stdin/stdout, launching the server first"
)]
pub struct Cli {
    /// Directory holding the server executable and its log file.
    #[arg(env = "GPMCP_BRIDGE_WORK_DIR", default_value = ".")]
    pub work_dir: PathBuf,

    /// Executable to launch, relative to the work directory.
    #[arg(long)]
    pub executable: Option<PathBuf>,

    /// Log file handed to the child as `-logFile <path>`.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    /// Seconds to wait after launch before connecting.
    #[arg(long)]
    pub warm_up_secs: Option<f64>,

    /// Seconds to wait for a graceful exit before killing the child.
    #[arg(long)]
    pub grace_secs: Option<f64>,

    /// Reject lines longer than this many bytes.
    #[arg(long)]
    pub max_message_bytes: Option<usize>,

    /// JSON configuration file; explicit flags take precedence.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    pub log_json: bool,

    /// Extra arguments passed to the child after `--`.
    #[arg(last = true)]
    pub child_args: Vec<String>,
}

impl Cli {
    /// Resolve flags, the optional config file and defaults into one configuration
    pub fn into_config(self) -> Result<BridgeConfig, BridgeError> {
        let work_dir = std::path::absolute(&self.work_dir).map_err(|e| {
            BridgeError::Configuration(format!(
                "cannot resolve work directory {}: {e}",
                self.work_dir.display()
            ))
        })?;

        let mut config = match &self.config {
            Some(path) => {
                let mut config = BridgeConfig::from_json_file(path)?;
                if let Some(executable) = &self.executable {
                    config.command = work_dir.join(executable);
                }
                if let Some(log_file) = &self.log_file {
                    config.args.extend(log_file_args(&work_dir, log_file));
                }
                config
                    .working_directory
                    .get_or_insert_with(|| work_dir.clone());
                config
            }
            None => {
                let executable = self
                    .executable
                    .clone()
                    .unwrap_or_else(default_executable);
                let log_file = self
                    .log_file
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(format!("{DEFAULT_EXECUTABLE}.log")));

                BridgeConfig::builder()
                    .command(work_dir.join(executable))
                    .args(log_file_args(&work_dir, &log_file))
                    .working_directory(work_dir.clone())
                    .build()
                    .map_err(|e| BridgeError::Configuration(e.to_string()))?
            }
        };

        config.args.extend(self.child_args);

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(secs) = self.warm_up_secs {
            config.warm_up_ms = secs_to_ms("warm-up", secs)?;
        }
        if let Some(secs) = self.grace_secs {
            config.termination_grace_ms = secs_to_ms("grace", secs)?;
        }
        if self.max_message_bytes.is_some() {
            config.max_message_bytes = self.max_message_bytes;
        }

        config.validate()?;
        Ok(config)
    }
}

fn default_executable() -> PathBuf {
    PathBuf::from(format!("{DEFAULT_EXECUTABLE}{}", std::env::consts::EXE_SUFFIX))
}

fn log_file_args(work_dir: &Path, log_file: &Path) -> [String; 2] {
    [
        "-logFile".to_string(),
        work_dir.join(log_file).to_string_lossy().into_owned(),
    ]
}

fn secs_to_ms(name: &str, secs: f64) -> Result<u64, BridgeError> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(BridgeError::Configuration(format!(
            "{name} seconds must be a non-negative number, got {secs}"
        )));
    }
    Ok((secs * 1000.0).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("gpmcp-bridge").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_follow_work_dir() {
        let work_dir = std::env::temp_dir();
        let config = parse(&[work_dir.to_str().unwrap()]).into_config().unwrap();

        assert_eq!(config.command, work_dir.join(default_executable()));
        assert_eq!(
            config.args,
            vec![
                "-logFile".to_string(),
                work_dir
                    .join("ai-unity-avatar.log")
                    .to_string_lossy()
                    .into_owned()
            ]
        );
        assert_eq!(config.working_directory, Some(work_dir));
        assert_eq!(config.upstream_addr(), "127.0.0.1:8080");
        assert_eq!(config.warm_up_ms, 10_000);
        assert_eq!(config.termination_grace_ms, 5_000);
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = parse(&[
            "/srv/unity",
            "--executable",
            "bin/server",
            "--port",
            "9100",
            "--warm-up-secs",
            "0.5",
            "--grace-secs",
            "2",
            "--max-message-bytes",
            "65536",
            "--",
            "-batchmode",
        ])
        .into_config()
        .unwrap();

        assert_eq!(config.command, PathBuf::from("/srv/unity/bin/server"));
        assert_eq!(config.args.last().map(String::as_str), Some("-batchmode"));
        assert_eq!(config.port, 9100);
        assert_eq!(config.warm_up_ms, 500);
        assert_eq!(config.termination_grace_ms, 2_000);
        assert_eq!(config.max_message_bytes, Some(65536));
    }

    #[test]
    fn test_relative_work_dir_is_absolutized() {
        let config = parse(&["build"]).into_config().unwrap();
        assert!(config.command.is_absolute());
        assert!(config.command.ends_with(Path::new("build").join(default_executable())));
    }

    #[test]
    fn test_config_file_with_flag_override() {
        let path = std::env::temp_dir().join(format!(
            "gpmcp-bridge-cli-{}.json",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"{"command":"/opt/app/server","args":["-batchmode"],"port":7000,"host":"localhost"}"#,
        )
        .unwrap();

        let config = parse(&["/srv", "--config", path.to_str().unwrap(), "--port", "7001"])
            .into_config()
            .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.command, PathBuf::from("/opt/app/server"));
        assert_eq!(config.args, vec!["-batchmode"]);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 7001);
        assert_eq!(config.working_directory, Some(PathBuf::from("/srv")));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            parse(&["--warm-up-secs=-1"]).into_config(),
            Err(BridgeError::Configuration(_))
        ));
        assert!(parse(&["--port", "0"]).into_config().is_err());
        assert!(Cli::try_parse_from(["gpmcp-bridge", "--port", "70000"]).is_err());
    }
}
