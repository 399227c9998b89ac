//! CLI entry point, grounded on `antfs_cli/program.py`'s `main`/`AntFSCLI`.

use std::fs;
use std::time::Duration;

use chrono::Local;
use clap::Parser;
use log::{error, info, LevelFilter};
use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode, WriteLogger};

use antfs::channel::Channel;
use antfs::config::{self, Args, Device};
use antfs::driver;
use antfs::error::Error;
use antfs::fs::beacon::ClientDeviceState;
use antfs::fs::session::{self, Session};
use antfs::frame::MessageId;
use antfs::scripting::Runner;
use antfs::sync::Orchestrator;
use antfs::transport::Transport;

const PRODUCT_NAME: &str = "antfs-cli";
const CHANNEL_TYPE_BIDIRECTIONAL_RECEIVE: u8 = 0x00;
const NETWORK_KEY: [u8; 8] = [0xa8, 0xa4, 0x23, 0xb9, 0xf5, 0x5e, 0x63, 0xc1];
const BEACON_WAIT: Duration = Duration::from_secs(5);

fn setup_logging(config_dir: &std::path::Path, debug: bool) -> std::io::Result<()> {
    let logs_dir = config_dir.join("logs");
    fs::create_dir_all(&logs_dir)?;

    let log_path = logs_dir.join(format!(
        "{}-{}.log",
        Local::now().format("%Y%m%d-%H%M%S"),
        PRODUCT_NAME
    ));
    let file_logger = WriteLogger::new(
        LevelFilter::Debug,
        Config::default(),
        fs::File::create(log_path)?,
    );

    let mut loggers: Vec<Box<dyn simplelog::SharedLogger>> = vec![file_logger];
    if debug {
        loggers.push(TermLogger::new(
            LevelFilter::Debug,
            Config::default(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ));
    }
    CombinedLogger::init(loggers).ok();
    Ok(())
}

fn run(args: &Args, config_dir: &std::path::Path) -> antfs::error::Result<()> {
    let driver = driver::open_first_available()?;
    let transport = Transport::spawn(driver);
    let channel = Channel::new(&transport, 0);

    println!("Request basic information...");
    let version = channel.request_message(MessageId::ResponseVersion as u8)?;
    info!("ANT version: {:?}", version.data);
    let capabilities = channel.request_message(MessageId::ResponseCapabilities as u8)?;
    info!("Capabilities: {:?}", capabilities.data);
    let serial = channel.request_message(MessageId::ResponseSerialNumber as u8)?;
    info!("Serial number: {:?}", serial.data);

    println!("Starting system...");
    channel.reset_system()?;
    channel.set_network_key(0x00, &NETWORK_KEY)?;
    channel.assign(CHANNEL_TYPE_BIDIRECTIONAL_RECEIVE, 0x00)?;

    let session = Session::new(channel);
    session.setup_channel()?;
    println!("Searching...");

    session.next_beacon(BEACON_WAIT)?;
    session.link()?;

    let result = (|| -> antfs::error::Result<()> {
        session::wait_for_state(&session, ClientDeviceState::Authentication, 5)?;

        let (serial_number, name) = session.authenticate_serial()?;
        println!("Authenticating with {:?} ({})", name, serial_number);
        let device = Device::open(config_dir, serial_number, name)?;

        let already_paired = device.read_passkey();
        let accepted = match (already_paired, args.pair) {
            (Some(passkey), false) => {
                print!(" - Passkey: ");
                session.authenticate_passkey(&passkey).map(|_| ())
            }
            _ => {
                print!(" - Pairing: ");
                session.authenticate_pair(PRODUCT_NAME).and_then(|passkey| {
                    device.write_passkey(&passkey)?;
                    Ok(())
                })
            }
        };

        match accepted {
            Ok(()) => println!("OK"),
            Err(e) => {
                println!("FAILED");
                return Err(e);
            }
        }

        session::wait_for_state(&session, ClientDeviceState::Transport, 5)?;

        let scripts_dir = config_dir.join("scripts");
        fs::create_dir_all(&scripts_dir)?;
        let runner = Runner::new(scripts_dir);

        Orchestrator::new(&session, &device, &runner, args.upload, args.skip_archived).run()
    })();

    session.disconnect().ok();
    result
}

fn main() -> std::process::ExitCode {
    let args = Args::parse();

    let config_dir = match config::config_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Error: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };
    if let Err(e) = fs::create_dir_all(&config_dir) {
        eprintln!("Error: could not create config directory: {e}");
        return std::process::ExitCode::FAILURE;
    }
    if let Err(e) = setup_logging(&config_dir, args.debug) {
        eprintln!("Error: could not set up logging: {e}");
        return std::process::ExitCode::FAILURE;
    }

    match run(&args, &config_dir) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(Error::ProfileVersionMismatch { found, expected }) => {
            println!(
                "\nError: local data directory is profile version {found}, expected {expected}.\n\n\
                 This means that {PRODUCT_NAME} found that your data directory structure was too \
                 old or too new. The best option is probably to let {PRODUCT_NAME} recreate your \
                 folder by deleting your data folder, after backing it up, and let all your files \
                 be redownloaded from your sports watch."
            );
            std::process::ExitCode::FAILURE
        }
        Err(e) => {
            error!("{:?}", e);
            println!("Interrupted: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}
