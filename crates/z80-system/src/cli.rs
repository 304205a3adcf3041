use crate::mode::Mode;

/// Default configuration file, relative to the current directory.
pub const DEFAULT_CFG: &str = "configuration.cfg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub mode: Mode,
    pub decomp_path: Option<String>,
    pub config_path: String,
}

/// Parses `std::env::args()`. See [`parse`] for the flag grammar.
#[must_use]
pub fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    parse(&args)
}

/// `-d <path>` switches to decompile mode on a flat byte image; `-T` switches
/// to test mode; `-c <path>` overrides the default config path. Flags may
/// appear in any order; a later one overrides an earlier one's mode choice,
/// matching the reference parser's sequential (not mutually exclusive) `if`s.
#[must_use]
pub fn parse(args: &[String]) -> CliArgs {
    let mut cli = CliArgs { mode: Mode::Normal, decomp_path: None, config_path: DEFAULT_CFG.to_string() };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-d" if i < args.len() - 1 => {
                i += 1;
                cli.mode = Mode::Decompile;
                cli.decomp_path = Some(args[i].clone());
            }
            "-T" => {
                cli.mode = Mode::Test;
            }
            "-c" if i < args.len() - 1 => {
                i += 1;
                cli.config_path = args[i].clone();
            }
            _ => {}
        }
        i += 1;
    }

    cli
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        std::iter::once("z0x50".to_string()).chain(v.iter().map(|s| s.to_string())).collect()
    }

    #[test]
    fn no_flags_means_normal_mode_with_default_config() {
        let cli = parse(&args(&[]));
        assert_eq!(cli.mode, Mode::Normal);
        assert_eq!(cli.config_path, DEFAULT_CFG);
        assert_eq!(cli.decomp_path, None);
    }

    #[test]
    fn dash_d_selects_decompile_mode_and_captures_path() {
        let cli = parse(&args(&["-d", "program.bin"]));
        assert_eq!(cli.mode, Mode::Decompile);
        assert_eq!(cli.decomp_path.as_deref(), Some("program.bin"));
    }

    #[test]
    fn trailing_dash_d_with_no_path_is_ignored() {
        let cli = parse(&args(&["-d"]));
        assert_eq!(cli.mode, Mode::Normal);
        assert_eq!(cli.decomp_path, None);
    }

    #[test]
    fn dash_capital_t_selects_test_mode() {
        let cli = parse(&args(&["-T"]));
        assert_eq!(cli.mode, Mode::Test);
    }

    #[test]
    fn dash_c_overrides_config_path() {
        let cli = parse(&args(&["-c", "other.cfg"]));
        assert_eq!(cli.config_path, "other.cfg");
    }

    #[test]
    fn flags_compose_in_order_given() {
        let cli = parse(&args(&["-c", "other.cfg", "-T"]));
        assert_eq!(cli.mode, Mode::Test);
        assert_eq!(cli.config_path, "other.cfg");
    }
}
