use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "qsp-player")]
#[command(about = "QSP game player with an agent protocol and a line mode")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Mode,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    Agent(AgentArgs),
    Play(PlayArgs),
}

#[derive(Debug, Args)]
pub(crate) struct AgentArgs {
    #[command(subcommand)]
    pub(crate) command: AgentCommand,
}

#[derive(Debug, Subcommand)]
pub(crate) enum AgentCommand {
    Start(StartArgs),
    Act(IndexArgs),
    Obj(IndexArgs),
    Input(InputArgs),
    Exec(ExecArgs),
    Counter(StateArgs),
}

#[derive(Debug, Args)]
pub(crate) struct StartArgs {
    #[arg(long = "game")]
    pub(crate) game: String,
    #[arg(long = "state-out")]
    pub(crate) state_out: String,
}

#[derive(Debug, Args)]
pub(crate) struct IndexArgs {
    #[arg(long = "state-in")]
    pub(crate) state_in: String,
    #[arg(long = "index")]
    pub(crate) index: usize,
    #[arg(long = "state-out")]
    pub(crate) state_out: String,
}

#[derive(Debug, Args)]
pub(crate) struct InputArgs {
    #[arg(long = "state-in")]
    pub(crate) state_in: String,
    #[arg(long = "text")]
    pub(crate) text: String,
    #[arg(long = "state-out")]
    pub(crate) state_out: String,
}

#[derive(Debug, Args)]
pub(crate) struct ExecArgs {
    #[arg(long = "state-in")]
    pub(crate) state_in: String,
    #[arg(long = "code")]
    pub(crate) code: String,
    #[arg(long = "state-out")]
    pub(crate) state_out: String,
}

#[derive(Debug, Args)]
pub(crate) struct StateArgs {
    #[arg(long = "state-in")]
    pub(crate) state_in: String,
    #[arg(long = "state-out")]
    pub(crate) state_out: String,
}

#[derive(Debug, Args)]
pub(crate) struct PlayArgs {
    #[arg(long = "game")]
    pub(crate) game: String,
    #[arg(long = "state-file")]
    pub(crate) state_file: Option<String>,
}
