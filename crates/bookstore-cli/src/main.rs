// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod demo;
mod logging;
mod runtime;

use anyhow::{Context, Result, anyhow, bail};
use bookstore_app::Session;
use bookstore_db::Store;
use config::Config;
use runtime::DbRuntime;
use std::path::{Path, PathBuf};

fn main() {
    if let Err(error) = run() {
        eprintln!("bookstore: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = parse_cli_args(std::env::args().skip(1), Config::default_path()?)?;
    match cli.action {
        Action::Help => {
            print_help();
            return Ok(());
        }
        Action::PrintConfigPath => {
            println!("{}", cli.config_path.display());
            return Ok(());
        }
        Action::PrintExampleConfig => {
            print!("{}", Config::example_config(&cli.config_path));
            return Ok(());
        }
        Action::PrintDbPath | Action::Check | Action::Run => {}
    }

    let config = Config::load(&cli.config_path).with_context(|| {
        format!(
            "load config {}; run `bookstore --print-example-config` to generate a v1 template",
            cli.config_path.display()
        )
    })?;

    let db_path = match (&cli.db_path, cli.demo) {
        (_, true) => PathBuf::from(":memory:"),
        (Some(path), false) => path.clone(),
        (None, false) => config.db_path()?,
    };
    if cli.action == Action::PrintDbPath {
        println!("{}", db_path.display());
        return Ok(());
    }
    if !cli.demo {
        check_db_dir(&db_path)?;
    }

    let _log_guard = logging::init(&config)?;
    tracing::info!(db = %db_path.display(), demo = cli.demo, "starting bookstore");

    let date_format = config.date_format()?;
    let mut store = Store::open(&db_path).with_context(|| {
        format!(
            "open database {} -- if this path is wrong, set [storage].db_path or BOOKSTORE_DB_PATH",
            db_path.display()
        )
    })?;
    store.bootstrap()?;
    store.set_busy_timeout(config.busy_timeout()?)?;
    store.set_date_format(date_format);
    if cli.demo {
        demo::seed_demo_data(&store)?;
    }

    let reports_dir = config.reports_dir()?;
    if cli.action == Action::Check {
        tracing::info!("configuration and database look fine");
        return Ok(());
    }

    let mut session = Session::new(config.remember_subset(), date_format);
    let mut runtime = DbRuntime::new(&store, reports_dir)
        .with_lock_attempts(config.lock_attempts())
        .with_currency_symbol(config.currency_symbol());
    bookstore_tui::run_app(&mut session, &mut runtime)
}

/// The database file may be created, its directory may not.
fn check_db_dir(db_path: &Path) -> Result<()> {
    let Some(dir) = db_path.parent().filter(|dir| !dir.as_os_str().is_empty()) else {
        return Ok(());
    };
    if !dir.is_dir() {
        bail!(
            "database directory {} does not exist; create it or point [storage].db_path elsewhere",
            dir.display()
        );
    }
    Ok(())
}

/// What the invocation asks for. When several flags are given the highest one wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Action {
    Run,
    Check,
    PrintDbPath,
    PrintExampleConfig,
    PrintConfigPath,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Cli {
    config_path: PathBuf,
    db_path: Option<PathBuf>,
    demo: bool,
    action: Action,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<Cli>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut cli = Cli {
        config_path: default_config_path,
        db_path: None,
        demo: false,
        action: Action::Run,
    };

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let requested = match arg.as_ref() {
            "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow!("--config needs a file path after it"))?;
                cli.config_path = PathBuf::from(path.as_ref());
                continue;
            }
            "--demo" => {
                cli.demo = true;
                continue;
            }
            "--check" => Action::Check,
            "--print-path" => Action::PrintDbPath,
            "--print-example-config" => Action::PrintExampleConfig,
            "--print-config-path" => Action::PrintConfigPath,
            "-h" | "--help" => Action::Help,
            flag if flag.starts_with('-') => {
                bail!("unrecognized option {flag:?}; see `bookstore --help`")
            }
            path => {
                if let Some(first) = &cli.db_path {
                    bail!(
                        "only one database path may be given: {} and {path:?}",
                        first.display()
                    );
                }
                bookstore_db::validate_db_path(path)?;
                cli.db_path = Some(PathBuf::from(path));
                continue;
            }
        };
        cli.action = cli.action.max(requested);
    }

    Ok(cli)
}

fn print_help() {
    println!(
        "\
bookstore {version}
Catalog of books, authors, publishers and warehouses.

usage: bookstore [options] [database path]

options:
  --config <path>          read settings from <path>
  --demo                   start on a throwaway in-memory catalog
  --check                  load config and open the database, then exit
  --print-path             show which database file would be opened
  --print-config-path      show which config file would be read
  --print-example-config   print a commented v1 config
  -h, --help               this text",
        version = env!("CARGO_PKG_VERSION")
    );
}

#[cfg(test)]
mod tests {
    use super::{Action, Cli, check_db_dir, parse_cli_args};
    use anyhow::Result;
    use std::path::PathBuf;

    fn config_path() -> PathBuf {
        PathBuf::from("/etc/bookstore/config.toml")
    }

    fn parse(args: &[&str]) -> Result<Cli> {
        parse_cli_args(args.iter().copied(), config_path())
    }

    #[test]
    fn no_arguments_runs_the_ui() -> Result<()> {
        assert_eq!(
            parse(&[])?,
            Cli {
                config_path: config_path(),
                db_path: None,
                demo: false,
                action: Action::Run,
            }
        );
        Ok(())
    }

    #[test]
    fn config_flag_replaces_the_default_path() -> Result<()> {
        let cli = parse(&["--config", "/home/ana/bookstore.toml"])?;
        assert_eq!(cli.config_path, PathBuf::from("/home/ana/bookstore.toml"));
        assert_eq!(cli.action, Action::Run);

        let error = parse(&["--config"]).expect_err("dangling --config should fail");
        assert!(error.to_string().contains("needs a file path"));
        Ok(())
    }

    #[test]
    fn unknown_option_points_at_help() {
        let error = parse(&["--verbose"]).expect_err("unknown option should fail");
        let message = error.to_string();
        assert!(message.contains("unrecognized option \"--verbose\""));
        assert!(message.contains("--help"));
    }

    #[test]
    fn positional_argument_is_the_database() -> Result<()> {
        let cli = parse(&["--demo", "/srv/shop/books.db"])?;
        assert_eq!(cli.db_path, Some(PathBuf::from("/srv/shop/books.db")));
        assert!(cli.demo);

        let error = parse(&["a.db", "b.db"]).expect_err("two paths should fail");
        assert!(error.to_string().contains("only one database path"));
        Ok(())
    }

    #[test]
    fn uri_database_path_is_rejected() {
        let error = parse(&["file:books.db?mode=ro"]).expect_err("URI path should fail");
        assert!(error.to_string().contains("file: URI"));
    }

    #[test]
    fn strongest_action_wins() -> Result<()> {
        assert_eq!(parse(&["--check"])?.action, Action::Check);
        assert_eq!(parse(&["--check", "--print-path"])?.action, Action::PrintDbPath);
        assert_eq!(
            parse(&["--print-config-path", "--print-example-config"])?.action,
            Action::PrintConfigPath
        );
        assert_eq!(parse(&["--check", "-h"])?.action, Action::Help);
        assert_eq!(parse(&["--help", "--check"])?.action, Action::Help);
        Ok(())
    }

    #[test]
    fn missing_db_directory_is_fatal() -> Result<()> {
        let temp = tempfile::tempdir()?;
        check_db_dir(&temp.path().join("bookstore.db"))?;
        check_db_dir(&PathBuf::from("bookstore.db"))?;

        let error = check_db_dir(&temp.path().join("missing").join("bookstore.db"))
            .expect_err("missing directory should fail");
        assert!(error.to_string().contains("does not exist"));
        Ok(())
    }
}
