// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod logging;
mod runtime;

use anyhow::{Context, Result, anyhow, bail};
use config::{Config, collection_names};
use fleetdesk_api::Client;
use fleetdesk_app::{
    ActionDispatcher, AppState, Collection, CollectionEndpoint, FetchStatus, NoticeLevel, Session,
    TableController, ViewLifetime,
};
use fleetdesk_testkit::{DEMO_TOKEN, MemoryEndpoint};
use logging::LogTarget;
use runtime::{Authenticator, DemoAuthenticator, RemoteRuntime};
use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const DEMO_SEED: u64 = 42;

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
            "load config {}; run `fleetdesk --print-example-config` to generate a v1 template",
            options.config_path.display()
        )
    })?;

    let list = options.list.as_deref().map(parse_collection).transpose()?;
    let interactive = !options.check_only && list.is_none();
    let log_file;
    let target = if interactive {
        log_file = config.log_file()?;
        LogTarget::File(&log_file)
    } else {
        LogTarget::Stderr
    };
    logging::init(config.log_level(), target)?;

    let session = Arc::new(Session::new());
    let (endpoint, authenticator): (Arc<dyn CollectionEndpoint>, Arc<dyn Authenticator>) =
        if options.demo {
            session.sign_in(DEMO_TOKEN);
            info!("demo mode: in-memory backend");
            (Arc::new(MemoryEndpoint::demo(DEMO_SEED)), Arc::new(DemoAuthenticator))
        } else {
            let client = Client::new(config.base_url(), config.timeout()?).with_context(|| {
                format!(
                    "invalid [api] config in {}; fix base_url/timeout values",
                    options.config_path.display()
                )
            })?;
            if options.sign_in.is_none()
                && let Some(token) = config.token()
            {
                session.sign_in(token);
            }
            let client = Arc::new(client);
            (client.clone(), client)
        };
    let mut runtime = RemoteRuntime::new(endpoint, authenticator, session);
    if let Some(identifier) = &options.sign_in {
        let password = env::var("FLEETDESK_PASSWORD").unwrap_or_default();
        let user = runtime
            .authenticate(identifier, &password)
            .with_context(|| format!("sign in to {}", config.base_url()))?;
        eprintln!("signed in as {user}");
    }
    if options.check_only {
        return Ok(());
    }

    if let Some(collection) = list {
        let mut stdout = io::stdout().lock();
        return list_collection(&runtime, collection, &mut stdout);
    }

    let mut state = AppState::new(config.start_tab());
    fleetdesk_tui::run_app(&mut state, &mut runtime, config.page_size())
}

fn parse_collection(name: &str) -> Result<Collection> {
    Collection::parse(name)
        .ok_or_else(|| anyhow!("unknown collection {name:?}; use one of: {}", collection_names()))
}

fn list_collection(
    runtime: &RemoteRuntime,
    collection: Collection,
    out: &mut impl Write,
) -> Result<()> {
    let mut dispatcher = ActionDispatcher::new(runtime.actions(collection));
    let mut table = TableController::new(collection, usize::MAX);
    let status = dispatcher.fetch_all(&mut table, &ViewLifetime::mounted(), |notice| {
        if notice.level == NoticeLevel::Info {
            eprintln!("{}", notice.message);
        }
    })?;
    if status == FetchStatus::Deferred {
        bail!(
            "not signed in -- set FLEETDESK_TOKEN or [api].token, or pass --sign-in <identifier>"
        );
    }
    write_rows(out, &table).context("write rows to stdout")
}

fn write_rows(out: &mut impl Write, table: &TableController) -> io::Result<()> {
    let columns = table.columns();
    let header = std::iter::once("id")
        .chain(columns.iter().map(|column| column.label))
        .collect::<Vec<_>>()
        .join("\t");
    writeln!(out, "{header}")?;
    for row in table.rows() {
        let mut cells = vec![row.id.to_string()];
        cells.extend(columns.iter().map(|column| row.display(column.key)));
        writeln!(out, "{}", cells.join("\t"))?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    demo: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
    list: Option<String>,
    sign_in: Option<String>,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        demo: false,
        print_example: false,
        check_only: false,
        show_help: false,
        list: None,
        sign_in: None,
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
            "--demo" => {
                options.demo = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--list" => {
                let value = iter.next().ok_or_else(|| {
                    anyhow!("--list requires a collection; use one of: {}", collection_names())
                })?;
                options.list = Some(value.as_ref().to_owned());
            }
            "--sign-in" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--sign-in requires a username or email"))?;
                options.sign_in = Some(value.as_ref().to_owned());
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                bail!("unknown argument {unknown:?}; run with --help to see supported options");
            }
        }
    }

    if options.demo && options.sign_in.is_some() {
        bail!("--sign-in cannot be used with --demo; the demo backend is already signed in");
    }
    Ok(options)
}

fn print_help() {
    println!("fleetdesk");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-example-config   Print a v1 config template");
    println!("  --demo                   Launch against an in-memory demo backend");
    println!("  --check                  Validate config and backend settings");
    println!("  --list <collection>      Print every row of a collection and exit");
    println!("  --sign-in <identifier>   Sign in first (password from FLEETDESK_PASSWORD)");
    println!("  --help                   Show this help");
}
