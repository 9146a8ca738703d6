//! 命令行选项解析。
//! `cpn <inspect|step|run|dot|demo> [net] [--seed N] [--config FILE] [--output FILE]`

use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Arg, ArgMatches, Command, value_parser};

use crate::net::ids::TransitionId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// 输出快照与可激发迁移
    Inspect { net: PathBuf },
    /// 发生一次迁移（缺省为 ID 最小的可激发迁移）
    Step {
        net: PathBuf,
        transition: Option<TransitionId>,
    },
    /// 反复发生直到没有可激发迁移或达到步数上限
    Run { net: PathBuf },
    Dot { net: PathBuf },
    Demo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub command: CliCommand,
    pub seed: Option<u64>,
    pub config: PathBuf,
    pub output: Option<PathBuf>,
}

fn net_arg() -> Arg {
    Arg::new("net")
        .value_name("NET")
        .help("Net definition file (.json, or .ron)")
        .required(true)
        .value_parser(value_parser!(PathBuf))
}

fn make_options_parser() -> Command {
    Command::new("cpn")
        .version("v0.1.0")
        .about("Colored Petri net runner")
        .subcommand_required(true)
        .arg(
            Arg::new("seed")
                .short('s')
                .long("seed")
                .value_name("SEED")
                .help("Seed for the random source used by expressions and token ids")
                .global(true)
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Engine configuration (TOML)")
                .global(true)
                .default_value("cpn.toml")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Write the result to FILE instead of stdout")
                .global(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .subcommand(
            Command::new("inspect")
                .about("Print the snapshot and the enabled transitions")
                .arg(net_arg()),
        )
        .subcommand(
            Command::new("step")
                .about("Fire one transition and print the new snapshot")
                .arg(net_arg())
                .arg(
                    Arg::new("transition")
                        .short('t')
                        .long("transition")
                        .value_name("ID")
                        .help("Transition to fire, defaults to the smallest enabled id"),
                ),
        )
        .subcommand(
            Command::new("run")
                .about("Fire until nothing is enabled or max_steps is reached")
                .arg(net_arg()),
        )
        .subcommand(
            Command::new("dot")
                .about("Render the net as Graphviz DOT")
                .arg(net_arg()),
        )
        .subcommand(Command::new("demo").about("Print the five-place example net"))
}

impl Options {
    /// 解析进程参数；遇到 `--help` 或非法输入时退出。
    pub fn from_env() -> Result<Self> {
        Self::from_matches(&make_options_parser().get_matches())
    }

    pub fn parse_from<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = make_options_parser().try_get_matches_from(args)?;
        Self::from_matches(&matches)
    }

    fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let Some((name, sub)) = matches.subcommand() else {
            anyhow::bail!("a subcommand is required");
        };
        let net = || {
            sub.get_one::<PathBuf>("net")
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("missing net file for `{}`", name))
        };
        let command = match name {
            "inspect" => CliCommand::Inspect { net: net()? },
            "step" => CliCommand::Step {
                net: net()?,
                transition: sub
                    .get_one::<String>("transition")
                    .map(|id| TransitionId::new(id.as_str())),
            },
            "run" => CliCommand::Run { net: net()? },
            "dot" => CliCommand::Dot { net: net()? },
            "demo" => CliCommand::Demo,
            other => anyhow::bail!("unknown subcommand `{}`", other),
        };
        Ok(Self {
            command,
            seed: sub.get_one::<u64>("seed").copied(),
            config: sub
                .get_one::<PathBuf>("config")
                .cloned()
                .unwrap_or_else(|| PathBuf::from("cpn.toml")),
            output: sub.get_one::<PathBuf>("output").cloned(),
        })
    }
}
