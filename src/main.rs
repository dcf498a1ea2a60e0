//! DS4QB bridge CLI
//!
//! Serves one DOS guest directory: watches the signal (or clipboard) file,
//! runs guest commands and plays them through the default audio device.

#[cfg(not(feature = "streaming"))]
fn main() {
    eprintln!(
        "The ds4qb-bridge CLI requires the \"streaming\" feature. Rebuild with `--features streaming` to enable playback."
    );
}

#[cfg(feature = "streaming")]
mod args;

#[cfg(feature = "streaming")]
mod cli {
    use std::io::{self, BufRead};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::Context;
    use tracing::info;
    use tracing_subscriber::EnvFilter;

    use ds4qb_bridge::protocol::binary::BinaryProtocol;
    use ds4qb_bridge::protocol::clipboard::ClipboardProtocol;
    use ds4qb_bridge::protocol::token::TokenProtocol;
    use ds4qb_bridge::transport::DirectoryGuest;
    use ds4qb_bridge::{AdapterConfig, Engine, PollingLoop, ProtocolAdapter, ProtocolVariant, RodioBackend};

    use crate::args::CliArgs;

    fn run_loop<P: ProtocolAdapter<DirectoryGuest>>(
        protocol: P,
        engine: Engine<RodioBackend>,
        guest: DirectoryGuest,
        interval: Duration,
        running: &AtomicBool,
    ) {
        let mut driver = PollingLoop::new(protocol, engine, guest).with_interval(interval);
        driver.run(running);
        let (sounds, music) = driver.shutdown();
        info!(sounds, music, "released");
    }

    fn spawn_quit_watcher(running: Arc<AtomicBool>) {
        std::thread::spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) if line.trim().eq_ignore_ascii_case("q") => break,
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
            running.store(false, Ordering::Relaxed);
        });
    }

    pub fn main() -> anyhow::Result<()> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(filter).init();

        let args = CliArgs::parse();
        if args.show_help {
            CliArgs::print_help();
            return Ok(());
        }

        let mut config = match &args.config {
            Some(path) => AdapterConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
            None => AdapterConfig::default(),
        };
        if let Some(protocol) = args.protocol {
            config.protocol = protocol;
        }
        if let Some(root) = args.root {
            config.root = root;
        }
        if let Some(working_dir) = args.working_dir {
            config.working_dir = working_dir;
        }
        config.validate()?;

        let backend = RodioBackend::new().context("opening audio output")?;
        let engine = Engine::new(backend);
        let guest = DirectoryGuest::new(&config.root, &config.signal_file, &config.clipboard_file);
        info!(
            protocol = ?config.protocol,
            root = %config.root.display(),
            working_dir = %config.working_dir,
            "bridge starting"
        );

        let running = Arc::new(AtomicBool::new(true));
        spawn_quit_watcher(Arc::clone(&running));

        let interval = config.interval();
        match config.protocol {
            ProtocolVariant::Binary => {
                run_loop(BinaryProtocol::new(config.working_dir), engine, guest, interval, &running)
            }
            ProtocolVariant::Token => run_loop(
                TokenProtocol::new(config.working_dir, &config.dat_path),
                engine,
                guest,
                interval,
                &running,
            ),
            ProtocolVariant::Clipboard => run_loop(ClipboardProtocol::new(), engine, guest, interval, &running),
        }
        Ok(())
    }
}

#[cfg(feature = "streaming")]
fn main() -> anyhow::Result<()> {
    cli::main()
}
