// Application configuration, loaded from environment variables and CLI flags.

use std::str::FromStr;

use crate::engine::GeneratorConfig;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (SQLite connection string).
    pub database_url: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Seats per game; the board is generated once they are all taken.
    pub max_players: i64,
    /// Board generation parameters used for every room.
    pub generator: GeneratorConfig,
    /// Engine worker threads (generation and `/api/solve`).
    pub worker_count: usize,
    /// Expansion cap for `/api/solve` requests that do not set one.
    pub solve_max_expansions: usize,
    /// Largest board (rows x cols) `/api/boards` will generate.
    pub max_board_cells: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: "sqlite:ricochet.db?mode=rwc".to_string(),
            port: 5000,
            max_players: 2,
            generator: GeneratorConfig::default(),
            worker_count: 4,
            solve_max_expansions: 2_000_000,
            max_board_cells: 1024,
        }
    }
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `DATABASE_URL` - SQLite connection string (default: `sqlite:ricochet.db?mode=rwc`)
    /// - `PORT` - HTTP server port (default: 5000)
    /// - `MAX_PLAYERS` - seats per game (default: 2)
    /// - `BOARD_ROWS`, `BOARD_COLS` - board size (default: 10x10)
    /// - `ROBOT_COUNT` - robots per board (default: 3)
    /// - `WALL_PROBABILITY` - interior wall chance (default: 0.1)
    /// - `MAX_ATTEMPTS` - candidates per generation (default: 500)
    /// - `GENERATION_DEADLINE_MS` - generation time budget, `0` for none (default: 5000)
    /// - `MAX_EXPANSIONS` - search cap per candidate and per solve (default: 2000000)
    /// - `WORKER_COUNT` - engine worker threads (default: 4)
    /// - `MAX_BOARD_CELLS` - largest board `/api/boards` accepts (default: 1024)
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    /// Build a config from CLI args and a variable lookup.
    pub fn from_sources<F>(args: &[String], var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let database_url = var("DATABASE_URL").unwrap_or(defaults.database_url);

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| parse_var(&var, "PORT"))
            .unwrap_or(defaults.port);

        let max_expansions: usize =
            parse_var(&var, "MAX_EXPANSIONS").unwrap_or(defaults.solve_max_expansions);

        let base = defaults.generator;
        let generator = GeneratorConfig {
            rows: parse_var(&var, "BOARD_ROWS").unwrap_or(base.rows),
            cols: parse_var(&var, "BOARD_COLS").unwrap_or(base.cols),
            robot_count: parse_var(&var, "ROBOT_COUNT").unwrap_or(base.robot_count),
            wall_probability: parse_var(&var, "WALL_PROBABILITY").unwrap_or(base.wall_probability),
            max_attempts: parse_var(&var, "MAX_ATTEMPTS").unwrap_or(base.max_attempts),
            deadline_ms: match parse_var::<u64, _>(&var, "GENERATION_DEADLINE_MS") {
                Some(0) => None,
                Some(ms) => Some(ms),
                None => base.deadline_ms,
            },
            max_expansions: Some(max_expansions),
        };

        Config {
            database_url,
            port,
            max_players: parse_var(&var, "MAX_PLAYERS")
                .filter(|n: &i64| *n > 0)
                .unwrap_or(defaults.max_players),
            generator,
            worker_count: parse_var(&var, "WORKER_COUNT")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.worker_count),
            solve_max_expansions: max_expansions,
            max_board_cells: parse_var(&var, "MAX_BOARD_CELLS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_board_cells),
        }
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}

fn parse_var<T, F>(var: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    var(key).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(&[], |_| None);
        assert_eq!(config.port, 5000);
        assert_eq!(config.max_players, 2);
        assert_eq!(config.generator.rows, 10);
        assert_eq!(config.generator.cols, 10);
        assert_eq!(config.generator.robot_count, 3);
        assert_eq!(config.generator.wall_probability, 0.1);
        assert_eq!(config.generator.deadline_ms, Some(5000));
        assert!(config.generator.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_sources(
            &[],
            lookup(&[
                ("PORT", "8080"),
                ("BOARD_ROWS", "8"),
                ("WALL_PROBABILITY", "0.25"),
                ("GENERATION_DEADLINE_MS", "0"),
                ("MAX_EXPANSIONS", "1000"),
                ("MAX_PLAYERS", "4"),
                ("MAX_BOARD_CELLS", "256"),
            ]),
        );
        assert_eq!(config.port, 8080);
        assert_eq!(config.generator.rows, 8);
        assert_eq!(config.generator.cols, 10);
        assert_eq!(config.generator.wall_probability, 0.25);
        assert_eq!(config.generator.deadline_ms, None);
        assert_eq!(config.generator.max_expansions, Some(1000));
        assert_eq!(config.solve_max_expansions, 1000);
        assert_eq!(config.max_players, 4);
        assert_eq!(config.max_board_cells, 256);
    }

    #[test]
    fn test_cli_port_wins() {
        let args = vec!["bin".to_string(), "--port".to_string(), "9000".to_string()];
        let config = Config::from_sources(&args, lookup(&[("PORT", "8080")]));
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn test_garbage_falls_back_to_defaults() {
        let config = Config::from_sources(
            &[],
            lookup(&[("PORT", "http"), ("WORKER_COUNT", "0"), ("MAX_PLAYERS", "-1")]),
        );
        assert_eq!(config.port, 5000);
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.max_players, 2);
    }
}
