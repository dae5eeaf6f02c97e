use clap::Parser;
use forgeup::app::{self, AppError};
use forgeup::backend::BackendRegistry;
use forgeup::cli::{AppContext, Cli, Commands};
use forgeup::infra::console::Console;
use forgeup::infra::prompt::StdinPrompter;

/// Logs go to stderr; `FORGEUP_LOG` takes an `EnvFilter` directive, default `warn`.
fn init_tracing(ctx: &AppContext) {
    use tracing_subscriber::{EnvFilter, fmt::time::ChronoLocal, prelude::*};

    let filter = EnvFilter::try_from_env("FORGEUP_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(ChronoLocal::rfc_3339())
        .with_ansi(!ctx.no_color);

    if let Err(err) = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
    {
        eprintln!("tracing already initialized: {err}");
    }
}

fn main() {
    let cli = Cli::parse();

    // Build a context once, pass everywhere
    let ctx = AppContext {
        quiet: cli.quiet,
        no_color: cli.no_color,
        dry_run: cli.dry_run,
    };
    init_tracing(&ctx);
    let console = Console::from_ctx(&ctx);
    let mut prompter = StdinPrompter;

    let result: Result<(), AppError> = match cli.command {
        Commands::Run(args) => {
            app::run_pipeline(&args, &ctx, &BackendRegistry::builtin(), &mut prompter).map(|_| ())
        }
        Commands::Revert(args) => app::revert(&args, &ctx, &mut prompter).map(|_| ()),
        Commands::Parse(args) => app::parse(&args, &ctx, &mut std::io::stdout()).map(|_| ()),
        Commands::Init(args) => forgeup::infra::config::init(args, &ctx).map_err(AppError::from),
        Commands::Completions(args) => {
            forgeup::completion::run(args, &ctx).map_err(AppError::from)
        }
    };

    app::finish_with_exit(result, &console);
}
