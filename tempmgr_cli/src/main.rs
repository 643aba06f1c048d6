mod cli;
mod error_fmt;
mod rt;
mod run;

use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{Cli, Commands, ModelCmd, FILE_GUARD};
use tempmgr_core::CoreConfig;

fn init_tracing(level: &str, logging: &tempmgr_config::Logging) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_deref().unwrap_or(level)));

    let registry = tracing_subscriber::registry().with(filter);
    match &logging.file {
        Some(path) => {
            let appender = match logging.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::daily(".", path),
                Some("hourly") => tracing_appender::rolling::hourly(".", path),
                _ => tracing_appender::rolling::never(".", path),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            registry
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(fmt::layer().json().with_writer(writer))
                .init();
        }
        None => {
            registry
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> eyre::Result<tempmgr_config::Config> {
    let cfg = match path {
        Some(p) => {
            let text = std::fs::read_to_string(p)
                .map_err(|e| eyre::eyre!("reading config {}: {e}", p.display()))?;
            tempmgr_config::load_toml(&text)
                .map_err(|e| eyre::eyre!("parsing config {}: {e}", p.display()))?
        }
        None => tempmgr_config::Config::default(),
    };
    cfg.validate().map_err(eyre::Report::new)?;
    Ok(cfg)
}

fn main() {
    let args = Cli::parse();
    match real_main(args) {
        Ok(()) => {}
        Err(e) => {
            eprintln!("{}", error_fmt::humanize(&e));
            std::process::exit(1);
        }
    }
}

fn real_main(args: Cli) -> eyre::Result<()> {
    let file_cfg = load_config(args.config.as_deref())?;
    init_tracing(&args.log_level, &file_cfg.logging);

    let core_cfg = CoreConfig::from(&file_cfg);
    let hotend_table = run::load_hotend_table(args.table.as_deref())?;
    let (mut harness, _plant) = run::build_machine(core_cfg, hotend_table, args.accel)?;

    match args.cmd {
        Commands::Heat {
            hotend,
            bed,
            fan,
            seconds,
            rt,
        } => {
            if rt {
                rt::setup_rt_once();
            }
            run::run_heat(&mut harness, hotend, bed, fan, seconds)
        }
        Commands::PidAutotune {
            heater,
            target,
            cycles,
        } => run::run_pid_autotune(&mut harness, run::heater_id(heater), target, cycles),
        Commands::Model(cmd) => run_model(&mut harness, &args.store, cmd),
    }
}

fn run_model(
    harness: &mut tempmgr_core::Harness,
    store_path: &std::path::Path,
    cmd: ModelCmd,
) -> eyre::Result<()> {
    let core = harness.core_mut();
    match cmd {
        ModelCmd::Set {
            p,
            c,
            ta_corr,
            warn,
            err,
            r,
        } => {
            core.model_set_params(
                c.unwrap_or(f32::NAN),
                p.unwrap_or(f32::NAN),
                ta_corr.unwrap_or(f32::NAN),
                warn.unwrap_or(f32::NAN),
                err.unwrap_or(f32::NAN),
            );
            for arg in r {
                let (idx, val) = run::parse_r_arg(&arg)?;
                core.model_set_resistance(idx, val);
            }
            print!("{}", core.model_report());
            Ok(())
        }
        ModelCmd::Report => {
            print!("{}", core.model_report());
            Ok(())
        }
        ModelCmd::Reset => {
            core.model_reset();
            print!("{}", core.model_report());
            Ok(())
        }
        ModelCmd::Save => {
            let mut store = run::open_store(store_path)?;
            core.model_save(&mut store)
        }
        ModelCmd::Load => {
            let mut store = run::open_store(store_path)?;
            core.model_load(&mut store)?;
            print!("{}", core.model_report());
            Ok(())
        }
        ModelCmd::Enable => {
            if core.model_set_enabled(true) {
                println!("TM: enabled");
            } else {
                println!("TM: invalid parameters, cannot enable");
            }
            Ok(())
        }
        ModelCmd::Disable => {
            core.model_set_enabled(false);
            println!("TM: disabled");
            Ok(())
        }
        ModelCmd::WarnBeep { on } => {
            core.model_set_warn_beep(on);
            Ok(())
        }
        ModelCmd::Autotune { target } => {
            let mut store = run::open_store(store_path)?;
            harness.run_model_autotune(target, &mut |line| println!("{line}"))?;
            harness.core_mut().model_save(&mut store)?;
            Ok(())
        }
    }
}
