use std::{
    io::{self, IsTerminal},
    path::PathBuf,
};

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{IntoDiagnostic, miette};
use qdb::{
    Frontend, Params, SessionError, SessionOptions,
    transport::{DEFAULT_CAPACITY, Listener, connect},
};

use crate::console::EditorConsole;

#[derive(Parser, Debug)]
#[command(name = "qdb")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(after_help = "# Examples:\n\n\
    ## To debug a script:\n\
    qdb run main.qs\n\n\
    ## To debug a script from another terminal or machine:\n\
    qdb serve --port 6000 main.qs\n\
    qdb connect --port 6000\n\n\
    ## To run a script without the debugger:\n\
    qdb exec main.qs")]
#[command(about = "qdb is a remote debugger for qdb-lang scripts.", long_about = None)]
pub struct Cli {
    #[clap(subcommand)]
    command: Commands,

    /// Print debug logs to stderr
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, default_value_t = false)]
    no_color: bool,
}

#[derive(Clone, Debug, clap::Args)]
struct SessionArgs {
    /// Messages buffered by the transport in each direction
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    queue_capacity: usize,

    /// Do not stop on uncaught exceptions
    #[arg(long, default_value_t = false)]
    no_postmortem: bool,

    /// Send the call stack with every stop
    #[arg(long, default_value_t = false)]
    call_stack: bool,

    /// Send local and global variables with every stop
    #[arg(long, default_value_t = false)]
    environment: bool,
}

impl SessionArgs {
    fn options(&self) -> SessionOptions {
        SessionOptions {
            params: Params {
                postmortem: !self.no_postmortem,
                call_stack: self.call_stack,
                environment: self.environment,
            },
            queue_capacity: self.queue_capacity,
            ..SessionOptions::default()
        }
    }
}

#[derive(Clone, Debug, clap::Args)]
struct ServerArgs {
    #[arg(long, env = "QDB_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, env = "QDB_PORT", default_value_t = 6000)]
    port: u16,

    /// Shared secret a frontend must present
    #[arg(long, env = "QDB_TOKEN", default_value = "qdb-secret", hide_env_values = true)]
    token: String,
}

#[derive(Clone, Debug, clap::Args)]
struct FrontendArgs {
    /// Notifications held while waiting for a response
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    max_pending: usize,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Debug a script on a backend thread of this process
    Run {
        #[clap(flatten)]
        session: SessionArgs,
        #[clap(flatten)]
        frontend: FrontendArgs,
        /// Path to the script
        script: PathBuf,
        /// Arguments passed to the script
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Wait for a remote frontend, then debug a script
    Serve {
        #[clap(flatten)]
        session: SessionArgs,
        #[clap(flatten)]
        server: ServerArgs,
        script: PathBuf,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Attach to a backend started with `qdb serve`
    Connect {
        #[clap(flatten)]
        server: ServerArgs,
        #[clap(flatten)]
        frontend: FrontendArgs,
        #[arg(long, default_value_t = DEFAULT_CAPACITY)]
        queue_capacity: usize,
    },
    /// Run a script without the debugger
    Exec { script: PathBuf },
}

impl Cli {
    pub fn run(&self) -> miette::Result<()> {
        qdb::log::init(self.verbose);
        let color = !self.no_color && io::stdout().is_terminal();
        if !color {
            colored::control::set_override(false);
        }

        match &self.command {
            Commands::Run {
                session,
                frontend,
                script,
                args,
            } => {
                let (backend, transport) =
                    qdb::spawn_local(script, argv(script, args), session.options()).into_diagnostic()?;
                let frontend =
                    Frontend::new(Box::new(transport), EditorConsole::new(color)?).with_max_pending(frontend.max_pending);
                qdb::Cli::new(frontend).with_color(color).run().into_diagnostic()?;

                finish(backend.join())
            }
            Commands::Serve {
                session,
                server,
                script,
                args,
            } => {
                let listener = Listener::bind((server.host.as_str(), server.port), server.token.as_str()).into_diagnostic()?;
                eprintln!(
                    "{} {}",
                    "Waiting for a frontend on".bold(),
                    listener.local_addr().into_diagnostic()?.to_string().cyan()
                );

                finish(qdb::session::serve(
                    listener,
                    script.clone(),
                    argv(script, args),
                    session.options(),
                ))
            }
            Commands::Connect {
                server,
                frontend,
                queue_capacity,
            } => {
                let transport = connect((server.host.as_str(), server.port), &server.token, *queue_capacity)
                    .map_err(|err| miette!("Failed to connect to {}:{}: {}", server.host, server.port, err))?;
                let frontend =
                    Frontend::new(Box::new(transport), EditorConsole::new(color)?).with_max_pending(frontend.max_pending);

                qdb::Cli::new(frontend).with_color(color).run().into_diagnostic()
            }
            Commands::Exec { script } => {
                qdb_lang::Interpreter::default().run_file(script)?;
                Ok(())
            }
        }
    }
}

fn argv(script: &std::path::Path, args: &[String]) -> Vec<String> {
    std::iter::once(script.display().to_string())
        .chain(args.iter().cloned())
        .collect()
}

/// Maps the end of a debugged program to the exit status. Uncaught
/// exceptions have already been shown by the frontend.
fn finish(result: Result<(), SessionError>) -> miette::Result<()> {
    match result {
        Ok(()) | Err(SessionError::Program(qdb_lang::Error::Aborted)) => Ok(()),
        Err(SessionError::Program(qdb_lang::Error::Exception(exception))) => {
            Err(miette!("Program exited with {}", exception.title()))
        }
        Err(SessionError::Program(qdb_lang::Error::Syntax(err))) => Err(miette!("SyntaxError: {}", err)),
        Err(err) => Err(err).into_diagnostic(),
    }
}
