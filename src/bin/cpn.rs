use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use rustcpn::config::EngineConfig;
use rustcpn::mdp::{StopReason, drive};
use rustcpn::net::io::{read_net, to_json_string};
use rustcpn::net::{NetDefinition, TransitionId};
use rustcpn::options::{CliCommand, Options};
use rustcpn::runner::{EnabledTransition, Runner, Step};

#[derive(Serialize)]
struct Inspection {
    net: NetDefinition,
    enabled: Vec<EnabledTransition>,
}

#[derive(Serialize)]
struct RunSummary {
    fired: Vec<TransitionId>,
    stop: &'static str,
    net: NetDefinition,
}

fn main() {
    if std::env::var("CPN_LOG").is_ok() {
        let e = env_logger::Env::new()
            .filter("CPN_LOG")
            .write_style("CPN_LOG_STYLE");
        env_logger::init_from_env(e);
    }

    if let Err(err) = run() {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = Options::from_env()?;
    log::debug!("cpn options: {:?}", options);

    let mut config = EngineConfig::load_from_file(&options.config)?;
    if options.seed.is_some() {
        config.seed = options.seed;
    }

    let rendered = match &options.command {
        CliCommand::Inspect { net } => {
            let runner = load(net, &config)?;
            let inspection = Inspection {
                net: runner.net(),
                enabled: runner.enabled(),
            };
            to_json_string(&inspection)?
        }
        CliCommand::Step { net, transition } => {
            let mut runner = load(net, &config)?;
            let step = match transition {
                Some(id) => Step::Transition(id.clone()),
                None => Step::Any,
            };
            to_json_string(&runner.step(&step)?)?
        }
        CliCommand::Run { net } => {
            let mut runner = load(net, &config)?;
            let mut first = |_: &NetDefinition, _: &[TransitionId]| -> Option<usize> { Some(0) };
            let episode = drive(&mut runner, &mut first, config.max_steps)?;
            let stop = match episode.stop {
                StopReason::NoActions => "no transition enabled",
                StopReason::StepLimit => "step limit reached",
                StopReason::PolicyDeclined => "policy declined",
            };
            let summary = RunSummary {
                fired: episode.outcomes.into_iter().map(|o| o.transition).collect(),
                stop,
                net: runner.net(),
            };
            to_json_string(&summary)?
        }
        CliCommand::Dot { net } => load(net, &config)?.to_dot(),
        CliCommand::Demo => to_json_string(&NetDefinition::example())?,
    };

    match &options.output {
        Some(path) => fs::write(path, rendered)
            .with_context(|| format!("Failed to write output file: {:?}", path))?,
        None => println!("{}", rendered),
    }
    Ok(())
}

fn load(path: &Path, config: &EngineConfig) -> Result<Runner> {
    let net = read_net(path).with_context(|| format!("Failed to load net: {:?}", path))?;
    Runner::with_config(&net, config).with_context(|| format!("Invalid net: {:?}", path))
}
