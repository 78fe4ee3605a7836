use std::io::Write;
use std::process::ExitCode;

use sim386::console::SerialConsole;
use sim386::{HaltReason, Simulator, SimulatorConfig, State};
use tracing_subscriber::EnvFilter;

fn read_file<T: Into<String>>(file_path: T) -> std::io::Result<Vec<u8>> {
    std::fs::read(file_path.into())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_logging();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        tracing::error!("usage: sim386 <image>");
        return ExitCode::from(2);
    };

    let image = match read_file(path.as_str()) {
        Ok(image) => image,
        Err(err) => {
            tracing::error!(path = %path, "failed to read image: {}", err);
            return ExitCode::from(2);
        }
    };

    let console = SerialConsole::new(std::io::stdin().lock(), std::io::stdout());
    let mut machine = Simulator::new(SimulatorConfig::default(), console);
    if let Err(err) = machine.load(&image) {
        tracing::error!("{}", err);
        return ExitCode::from(2);
    }

    let code = match machine.run() {
        State::Halted(HaltReason::EndOfProgram) => {
            println!("End of program.");
            ExitCode::SUCCESS
        }
        State::Halted(HaltReason::Fault(_)) => ExitCode::from(1),
        State::Running => unreachable!("run returns only once halted"),
    };

    let mut stdout = std::io::stdout().lock();
    if let Err(err) = machine
        .print_registers(&mut stdout)
        .and_then(|()| stdout.flush())
    {
        tracing::error!("failed to write the register dump: {}", err);
        return ExitCode::from(1);
    }

    code
}
