use std::io::{self, Write};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::{error, info, warn};

use console_mux::{
    ConsoleSink, DEFAULT_MAX_CLIENTS, Multiplexer, MuxError, PtyConsole, ReadinessNotifier,
    SetupStep,
};
use console_muxd::{endpoint, mounts, setup};

#[derive(Parser)]
#[command(name = "console-muxd")]
#[command(about = "Container console multiplexer daemon")]
struct Args {
    /// Primary-stage directory receiving the console device file
    #[arg(long, default_value = "/run/console-mux/tty")]
    stage_dir: PathBuf,

    /// Base directory of per-application rootfs trees (secondary stage)
    #[arg(long, default_value = "/opt/stage2")]
    rootfs_base: PathBuf,

    /// Directory receiving the attach endpoint advertisement
    #[arg(long, default_value = "/run/console-mux/status")]
    status_dir: PathBuf,

    /// Maximum number of simultaneously attached clients
    #[arg(long, default_value_t = DEFAULT_MAX_CLIENTS)]
    max_clients: usize,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

/// Echoes console output to the daemon's own stdout, where the supervisor
/// collects it as the application log stream.
struct StdoutEcho;

impl ConsoleSink for StdoutEcho {
    fn echo(&self, chunk: &[u8]) {
        let mut stdout = io::stdout();
        let _ = stdout.write_all(chunk);
        let _ = stdout.flush();
    }
}

/// Signals `READY=1` to the supervising service manager, releasing the
/// application start.
struct SupervisorNotifier;

impl ReadinessNotifier for SupervisorNotifier {
    fn notify_ready(&mut self) {
        if let Err(e) = sd_notify::notify(false, &[sd_notify::NotifyState::Ready]) {
            warn!(error = %e, "failed to signal readiness to supervisor");
        }
    }
}

fn main() {
    let args = Args::parse();

    let filter = if args.debug {
        "console_muxd=debug,console_mux=debug"
    } else {
        "console_muxd=info,console_mux=info"
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(args) {
        error!(error = %e, "console multiplexer failed");
        process::exit(e.exit_code());
    }
}

#[tokio::main(flavor = "current_thread")]
async fn run(args: Args) -> Result<(), MuxError> {
    let app_name = setup::discover_app_name()?;
    info!(app = %app_name, "starting console multiplexer");

    let console = PtyConsole::open()?;
    info!(slave = %console.slave_path().display(), "console pty allocated");

    let primary = mounts::publish_primary(console.slave_path(), &args.stage_dir, &app_name)?;
    let secondary = mounts::publish_secondary(console.slave_path(), &args.rootfs_base, &app_name)?;
    info!(
        primary = %primary.display(),
        secondary = %secondary.display(),
        "console published to stage mounts"
    );

    let listener = setup::bind_attach((Ipv4Addr::LOCALHOST, 0).into()).await?;
    let addr = listener
        .local_addr()
        .map_err(|e| MuxError::setup(SetupStep::SocketBind, e))?;
    let advertised = endpoint::advertise(&args.status_dir, &app_name, addr)?;
    info!(%addr, advertised = %advertised.display(), "attach listener bound");

    let mux = Multiplexer::new(
        console,
        listener,
        args.max_clients,
        Box::new(StdoutEcho),
        Box::new(SupervisorNotifier),
    )?;
    mux.run().await
}
