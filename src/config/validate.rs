// src/config/validate.rs

use std::path::PathBuf;
use std::time::Duration;

use crate::config::model::{ConfigFile, ProcessConfig, RawConfigFile, RegistrySection};
use crate::errors::{ProcregError, Result};
use crate::exec::LaunchSpec;
use crate::registry::RegistryOptions;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::ProcregError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let (tick_interval, options) = validate_registry_section(&raw.registry)?;
        let processes = raw
            .process
            .iter()
            .enumerate()
            .map(|(idx, p)| validate_process(idx, p))
            .collect::<Result<Vec<_>>>()?;

        Ok(ConfigFile::new_unchecked(
            tick_interval,
            raw.registry.shutdown,
            options,
            processes,
        ))
    }
}

fn validate_registry_section(section: &RegistrySection) -> Result<(Duration, RegistryOptions)> {
    let tick_interval = parse_duration(&section.tick_interval)
        .map_err(|e| config_error(format!("[registry].tick_interval: {e}")))?;
    if tick_interval.is_zero() {
        return Err(config_error(
            "[registry].tick_interval must be greater than zero".to_string(),
        ));
    }

    let force_kill_after = section
        .force_kill_after
        .as_deref()
        .map(parse_duration)
        .transpose()
        .map_err(|e| config_error(format!("[registry].force_kill_after: {e}")))?;

    let shutdown_grace = parse_duration(&section.shutdown_grace)
        .map_err(|e| config_error(format!("[registry].shutdown_grace: {e}")))?;

    let options = RegistryOptions {
        force_kill_after,
        history_limit: section.history_limit,
        shutdown_grace,
        output: section.output,
    };

    Ok((tick_interval, options))
}

fn validate_process(idx: usize, p: &ProcessConfig) -> Result<LaunchSpec> {
    if p.executable.trim().is_empty() {
        return Err(config_error(format!(
            "process #{} has an empty `executable`",
            idx + 1
        )));
    }

    let working_dir = p.working_dir.clone().unwrap_or_else(PathBuf::new);

    match (&p.args, &p.arguments) {
        (Some(_), Some(_)) => Err(config_error(format!(
            "process #{} ('{}') sets both `args` and `arguments`; use one",
            idx + 1,
            p.executable
        ))),
        (Some(args), None) => Ok(LaunchSpec::new(&p.executable, args.clone(), working_dir)),
        (None, Some(line)) => LaunchSpec::from_command_line(&p.executable, line, working_dir)
            .map_err(|e| config_error(format!("process #{}: {e}", idx + 1))),
        (None, None) => Ok(LaunchSpec::new(&p.executable, Vec::<String>::new(), working_dir)),
    }
}

fn config_error(msg: String) -> ProcregError {
    ProcregError::ConfigError(msg)
}

/// Parse durations like `"500ms"`, `"3s"`, `"2m"` or `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{}' is missing a unit suffix", s))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };

    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{}' is too large", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_units() {
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("3s"), Ok(Duration::from_secs(3)));
        assert_eq!(parse_duration(" 2m "), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
    }

    #[test]
    fn rejects_bad_durations() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn oversized_durations_are_errors() {
        assert!(parse_duration("18446744073709551615h").is_err());
        assert!(parse_duration("18446744073709551615m").is_err());
        assert!(parse_duration("99999999999999999999s").is_err());
        assert_eq!(
            parse_duration("18446744073709551615s"),
            Ok(Duration::from_secs(u64::MAX))
        );
    }
}
