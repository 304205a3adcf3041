use std::process;

use z80_config::Settings;
use z80_log::{Level, Logger};
use z80_system::{self as system, Machine, Mode};

const HEADER_ART: &str = " _____   ____         ______ ____\n/__  /  / __ \\ _  __ / ____// __ \\\n  / /  / / / /| |/_//___ \\ / / / /\n / /__/ /_/ /_>  < ____/ // /_/ /\n/____/\\____//_/|_|/_____/ \\____/\n";
const TERMINAL_SPLIT: &str = "---------------------------------------\n";

fn main() {
    let cli = system::parse_args();
    let mut log = Logger::new();

    log.log_direct(TERMINAL_SPLIT);
    log.log_direct(HEADER_ART);
    log.log_direct("\n\nZ0x50 | Zilog 80 Emulator\n");
    if cfg!(debug_assertions) {
        log.log_direct("[COMPILED IN DEBUG MODE]\n");
    }
    log.log_direct(TERMINAL_SPLIT);

    log.log(Level::Msg, "Parsing CFG\n");
    let settings = match Settings::load(&cli.config_path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read configuration file '{}': {e}", cli.config_path);
            process::exit(1);
        }
    };

    log.log(Level::Msg, "Initialising system\n");
    let oscillator_freq = settings.get_double("oscillator_freq");
    let mut machine = match Machine::new(oscillator_freq, cli.mode) {
        Ok(machine) => machine,
        Err(e) => {
            eprintln!("Failed to attach signal fabric: {e}");
            process::exit(1);
        }
    };

    match cli.mode {
        Mode::Normal => {
            system::load_memory_devices(&settings, &machine.memory, &mut log);
            if !system::load_bios_rom(&settings, &machine.signals, &machine.bus, &machine.memory, &mut log) {
                eprintln!("Failed to load BIOS ROM, exiting");
                process::exit(1);
            }
        }
        Mode::Decompile => {
            let Some(path) = cli.decomp_path.clone() else {
                eprintln!("Decompile mode requires -d <path>");
                process::exit(1);
            };
            if !system::run_decompile(&path, &mut log) {
                process::exit(1);
            }
            machine.mode = Mode::None;
        }
        Mode::Test | Mode::None => {}
    }

    log.log(Level::Msg, "Launching\n");
    loop {
        match machine.mode {
            Mode::None => break,
            Mode::Normal => {
                if let Some(reason) = machine.step_normal() {
                    log.log(Level::Msg, &format!("{reason}\n"));
                }
            }
            Mode::Test => {
                if let Some(reason) = machine.step_test() {
                    log.log(Level::Msg, &format!("{reason}\n"));
                }
            }
            Mode::Decompile => machine.mode = Mode::None,
        }
    }

    log.log(Level::Msg, "Exiting\n");
}
