use clap::Parser;
use fetalcall::{
    cli::{init_verbose, Cli, Command, FULL_VERSION},
    commands::{build, call, fraction},
    utils::{handle_error_and_exit, Result},
};

fn runner() -> Result<()> {
    let cli = Cli::parse();
    init_verbose(&cli);
    let subcommand_name = match cli.command {
        Command::Build(_) => "build",
        Command::Fraction(_) => "fraction",
        Command::Call(_) => "call",
    };

    log::info!(
        "Running {}-{} [{}]",
        env!("CARGO_PKG_NAME"),
        *FULL_VERSION,
        subcommand_name
    );
    match cli.command {
        Command::Build(args) => build::build(args)?,
        Command::Fraction(args) => fraction::fraction(args)?,
        Command::Call(args) => call::call(args)?,
    }
    log::info!("{} end", env!("CARGO_PKG_NAME"));
    Ok(())
}

fn main() {
    if let Err(e) = runner() {
        handle_error_and_exit(e);
    }
}
