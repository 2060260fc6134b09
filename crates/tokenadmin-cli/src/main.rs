// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod logging;
mod runtime;

use anyhow::{Context, Result, anyhow, bail};
use config::Config;
use logging::LogConfig;
use runtime::Shell;
use std::env;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokenadmin_app::{ListRequest, PageSizes, SortSpec, ViewKind, Vocabulary};
use tokenadmin_client::Client;
use tracing::info;

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `tokenadmin --print-example-config` to generate a v1 template",
            options.config_path.display()
        )
    })?;

    logging::init_logging(&LogConfig::from_settings(
        config.log_level(),
        config.log_format(),
        options.verbosity,
    )?)?;

    let page_sizes = config.page_sizes()?;
    let request = options.list_request(&page_sizes)?;
    if options.print_query {
        let query = request.to_query(&options.view.classification());
        for (key, value) in &query {
            println!("{key}={value}");
        }
        return Ok(());
    }

    let timeout = config.timeout()?;
    let client = Client::new(
        config.base_url()?,
        config.auth_token().as_deref(),
        timeout,
    )
    .with_context(|| {
        format!(
            "invalid [server] config in {}; fix base_url/timeout values",
            options.config_path.display()
        )
    })?;
    info!(
        base_url = client.base_url(),
        authenticated = client.has_auth_token(),
        "client ready"
    );

    if options.check_only {
        client.ping()?;
        println!("ok: {} is reachable", client.base_url());
        return Ok(());
    }

    // Fetch workers give up after `timeout`; leave room for decoding.
    let wait = timeout + Duration::from_secs(1);
    let mut shell = Shell::new(Arc::new(client), page_sizes, wait);
    if options.shell {
        shell.open_view(options.view, &options.filter, request);
        let stdin = io::stdin();
        return runtime::run_shell(&mut shell, stdin.lock(), io::stdout());
    }

    print!("{}", shell.fetch_once(options.view, &options.filter, request)?);
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
    view: ViewKind,
    filter: String,
    page: usize,
    page_size: Option<usize>,
    sort: Option<String>,
    print_query: bool,
    shell: bool,
    verbosity: u8,
}

impl CliOptions {
    /// The request the first fetch uses. Page and size are checked here so
    /// typos fail loudly instead of falling back to defaults.
    fn list_request(&self, page_sizes: &PageSizes) -> Result<ListRequest> {
        let page_size = match self.page_size {
            Some(size) if page_sizes.allowed().contains(&size) => size,
            Some(size) => bail!(
                "--page-size {size} is not allowed; choose one of {:?} or change [list].page_sizes",
                page_sizes.allowed()
            ),
            None => page_sizes.default_size(),
        };
        let sort = match &self.sort {
            Some(raw) => SortSpec::parse(raw).ok_or_else(|| {
                anyhow!("invalid --sort {raw:?}; use <column>, <column>:asc or <column>:desc")
            })?,
            None => SortSpec::unsorted(),
        };

        Ok(ListRequest {
            page_index: self.page - 1,
            page_size,
            sort,
            filter: Vocabulary::new(&self.view.keywords()).parse(&self.filter),
        })
    }
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        print_example: false,
        check_only: false,
        show_help: false,
        view: ViewKind::Tokens,
        filter: String::new(),
        page: 1,
        page_size: None,
        sort: None,
        print_query: false,
        shell: false,
        verbosity: 0,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--view" => {
                let value = iter.next().ok_or_else(|| {
                    anyhow!("--view requires one of tokens, containers, machines, challenges")
                })?;
                options.view = ViewKind::parse(value.as_ref()).ok_or_else(|| {
                    anyhow!(
                        "unknown view {:?}; use tokens, containers, machines or challenges",
                        value.as_ref()
                    )
                })?;
            }
            "--filter" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--filter requires filter text"))?;
                options.filter = value.as_ref().to_owned();
            }
            "--page" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--page requires a page number"))?;
                let page: usize = value
                    .as_ref()
                    .parse()
                    .with_context(|| format!("--page expects a number, got {:?}", value.as_ref()))?;
                if page == 0 {
                    bail!("--page counts from 1");
                }
                options.page = page;
            }
            "--page-size" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--page-size requires a number"))?;
                let size: usize = value.as_ref().parse().with_context(|| {
                    format!("--page-size expects a number, got {:?}", value.as_ref())
                })?;
                options.page_size = Some(size);
            }
            "--sort" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--sort requires <column>[:asc|:desc]"))?;
                options.sort = Some(value.as_ref().to_owned());
            }
            "--print-query" => {
                options.print_query = true;
            }
            "--shell" => {
                options.shell = true;
            }
            "-v" | "--verbose" => {
                options.verbosity = options.verbosity.saturating_add(1);
            }
            "-vv" => {
                options.verbosity = options.verbosity.saturating_add(2);
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                return Err(anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("tokenadmin: list and manage 2FA tokens on a privacyIDEA-compatible server");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-example-config   Print a v1 config template");
    println!("  --check                  Validate config and ping the server");
    println!("  --view <name>            tokens (default), containers, machines, challenges");
    println!("  --filter <text>          Filter text, e.g. \"serial: oath active: true\"");
    println!("  --page <n>               Page to show, counting from 1");
    println!("  --page-size <n>          Rows per page; one of [list].page_sizes");
    println!("  --sort <column[:dir]>    Sort column with asc or desc");
    println!("  --print-query            Print the query sent to the server and exit");
    println!("  --shell                  Keep the list open and read commands from stdin");
    println!("  -v, -vv                  More log output on stderr");
    println!("  --help                   Show this help");
}

#[cfg(test)]
mod tests {
    use super::{CliOptions, parse_cli_args};
    use anyhow::Result;
    use std::path::PathBuf;
    use tokenadmin_app::{PageSizes, SortDirection, ViewKind};

    fn default_options_path() -> PathBuf {
        PathBuf::from("/tmp/tokenadmin-config.toml")
    }

    fn default_options() -> CliOptions {
        CliOptions {
            config_path: default_options_path(),
            print_config_path: false,
            print_example: false,
            check_only: false,
            show_help: false,
            view: ViewKind::Tokens,
            filter: String::new(),
            page: 1,
            page_size: None,
            sort: None,
            print_query: false,
            shell: false,
            verbosity: 0,
        }
    }

    #[test]
    fn parse_cli_args_defaults_to_provided_config_path() -> Result<()> {
        let options = parse_cli_args(Vec::<String>::new(), default_options_path())?;
        assert_eq!(options, default_options());
        Ok(())
    }

    #[test]
    fn parse_cli_args_supports_config_and_print_flags() -> Result<()> {
        let options = parse_cli_args(
            [
                "--config",
                "/tmp/custom.toml",
                "--print-config-path",
                "--check",
            ],
            default_options_path(),
        )?;
        assert_eq!(
            options,
            CliOptions {
                config_path: PathBuf::from("/tmp/custom.toml"),
                print_config_path: true,
                check_only: true,
                ..default_options()
            }
        );
        Ok(())
    }

    #[test]
    fn parse_cli_args_reads_list_options() -> Result<()> {
        let options = parse_cli_args(
            [
                "--view",
                "containers",
                "--filter",
                "type: smartphone",
                "--page",
                "3",
                "--page-size",
                "25",
                "--sort",
                "serial:desc",
                "--shell",
                "-v",
                "-v",
            ],
            default_options_path(),
        )?;
        assert_eq!(
            options,
            CliOptions {
                view: ViewKind::Containers,
                filter: "type: smartphone".to_owned(),
                page: 3,
                page_size: Some(25),
                sort: Some("serial:desc".to_owned()),
                shell: true,
                verbosity: 2,
                ..default_options()
            }
        );
        Ok(())
    }

    #[test]
    fn parse_cli_args_rejects_unknown_flags_and_bad_values() {
        let cases: [(&[&str], &str); 5] = [
            (&["--wat"], "unknown argument"),
            (&["--config"], "requires a file path"),
            (&["--view", "users"], "unknown view"),
            (&["--page", "0"], "counts from 1"),
            (&["--page-size", "many"], "expects a number"),
        ];
        for (args, expected) in cases {
            let error = parse_cli_args(args.iter().copied(), default_options_path())
                .expect_err("arguments should be rejected");
            assert!(
                format!("{error:#}").contains(expected),
                "{args:?}: {error:#}"
            );
        }
    }

    #[test]
    fn list_request_uses_one_based_page_and_parsed_filter() -> Result<()> {
        let options = parse_cli_args(
            [
                "--filter",
                "serial: OATH01 active: false",
                "--page",
                "2",
                "--sort",
                "serial:desc",
            ],
            default_options_path(),
        )?;
        let request = options.list_request(&PageSizes::default())?;
        assert_eq!(request.page_index, 1);
        assert_eq!(request.page_size, 15);
        assert_eq!(request.sort.column, "serial");
        assert_eq!(request.sort.direction, SortDirection::Desc);
        assert_eq!(request.filter.get("serial"), Some("oath01"));

        let query = request.to_query(&ViewKind::Tokens.classification());
        assert_eq!(query.get("serial").map(String::as_str), Some("*oath01*"));
        assert_eq!(query.get("active").map(String::as_str), Some("false"));
        assert_eq!(query.get("page").map(String::as_str), Some("2"));
        Ok(())
    }

    #[test]
    fn list_request_rejects_disallowed_page_size_and_bad_sort() -> Result<()> {
        let options = parse_cli_args(["--page-size", "7"], default_options_path())?;
        let error = options
            .list_request(&PageSizes::default())
            .expect_err("7 is not an allowed size");
        assert!(error.to_string().contains("--page-size 7"));

        let options = parse_cli_args(["--sort", "serial:sideways"], default_options_path())?;
        let error = options
            .list_request(&PageSizes::default())
            .expect_err("bad direction");
        assert!(error.to_string().contains("invalid --sort"));
        Ok(())
    }
}
