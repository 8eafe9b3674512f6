// src/bin/brock.rs

use anyhow::Result;
use brock::{
    CancellationToken,
    cli::{Cli, dispatcher},
    constants::{CONFIG_ERROR_CODE, INTERRUPTED_CODE, USAGE_ERROR_CODE},
    core::{
        config_resolver::{ConfigError, ConfigResolver},
        console::{Console, Verbosity},
        project::Project,
    },
    error::BrockError,
    executors::Runtime,
    t,
};
use clap::Parser;
use colored::*;
use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Sets up logging and Ctrl+C handling, runs the invocation and exits with
/// the step exit code or the code of the tool failure.
fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { USAGE_ERROR_CODE } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let verbosity = Verbosity::from_occurrences(cli.verbose);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(verbosity.log_filter()))
        .init();
    if cli.no_color {
        colored::control::set_override(false);
    }
    let console = Console::new(verbosity, !cli.no_color);

    let cancellation_token: CancellationToken = Arc::new(AtomicBool::new(false));
    listen_for_interrupt(cancellation_token.clone());

    let code = match run_cli(cli.args, console, cancellation_token) {
        Ok(code) => code,
        Err(e) => report_error(&e),
    };
    std::process::exit(code);
}

/// Flips the token on every Ctrl+C. Running children are killed by whoever
/// waits on them; the process itself keeps going so the exit hooks run.
fn listen_for_interrupt(cancellation_token: CancellationToken) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                log::warn!("Ctrl+C handler could not be installed: {}", e);
                return;
            }
        };
        runtime.block_on(async {
            while tokio::signal::ctrl_c().await.is_ok() {
                log::debug!("Interrupt received");
                cancellation_token.store(true, Ordering::SeqCst);
            }
        });
    });
}

fn run_cli(args: Vec<String>, console: Console, cancellation_token: CancellationToken) -> Result<i32> {
    let cwd = env::current_dir()?;
    let config = ConfigResolver::new()
        .resolve(&cwd)
        .map_err(BrockError::from)?;

    let runtime = Runtime::new(console, cancellation_token);
    let project = Project::from_config(&config, &runtime).map_err(BrockError::from)?;

    // The exit hooks run on every path out of here, including errors.
    let mut project = scopeguard::guard(project, move |mut project| {
        if let Err(e) = project.on_exit() {
            console.error(&format!(t!("main.error.exit_hook"), error = e));
        }
    });

    dispatcher::dispatch(args, &mut project)
}

/// Prints a tool failure and picks the exit code for it.
fn report_error(e: &anyhow::Error) -> i32 {
    if let Some(brock_err) = e.downcast_ref::<BrockError>() {
        if brock_err.is_interrupted() {
            return INTERRUPTED_CODE;
        }
        eprintln!("\n{}: {}", "Error".red().bold(), brock_err);
        return brock_err.exit_code();
    }
    if let Some(config_err) = e.downcast_ref::<ConfigError>() {
        eprintln!("\n{}: {}", "Error".red().bold(), config_err);
        return CONFIG_ERROR_CODE;
    }
    if let Some(clap_err) = e.downcast_ref::<clap::Error>() {
        let _ = clap_err.print();
        return if clap_err.use_stderr() { USAGE_ERROR_CODE } else { 0 };
    }

    eprintln!("\n{}: {}", "Error".red().bold(), e);
    1
}
