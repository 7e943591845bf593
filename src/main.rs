use buildloom::cli::commands::{CliArgs, Commands};
use buildloom::cli::handlers::{
    handle_build, handle_cancel, handle_graph, handle_list, handle_status,
};
use buildloom::util::logging::{config_from_env, init_logging, parse_level};
use buildloom::VERSION;

use clap::Parser;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("buildloom v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Graph(graph_args) => handle_graph(graph_args).await,
        Commands::Build(build_args) => handle_build(build_args).await,
        Commands::Status(status_args) => handle_status(status_args).await,
        Commands::List(list_args) => handle_list(list_args).await,
        Commands::Cancel(cancel_args) => handle_cancel(cancel_args).await,
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let mut config = config_from_env();
    if let Some(level_str) = &args.log_level {
        config.level = parse_level(level_str);
    } else if args.verbose {
        config.level = Level::DEBUG;
    } else if args.quiet {
        config.level = Level::ERROR;
    }
    init_logging(config);
}
