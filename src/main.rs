//! # GBA Emulation Core - CLI Entry Point
//!
//! This binary is a minimal headless driver for the [`emu`] crate: it loads
//! a BIOS and cartridge image, then runs the core's instruction loop until
//! interrupted. It intentionally has no window, no audio output, and no
//! keypad polling; those concerns belong to a host layer built on top of
//! [`emu::gba::Gba`], which only exposes a framebuffer and a keypad
//! register.
//!
//! ## Exit codes
//!
//! | Code | Meaning                                      |
//! |------|-----------------------------------------------|
//! | 0    | Clean shutdown (Ctrl+C received)               |
//! | 1    | Host error: missing file, bad size, or the core failed to initialize |
//! | -1   | Missing the cartridge path argument            |
//! | 2    | A decode or execute error terminated the core  |

use std::{
    fs,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use emu::gba::Gba;
use logger::log;

#[cfg(feature = "logger")]
use logger::{LogKind, init_logger};

const BIOS_PATH: &str = "gba_bios.bin";
const BIOS_SIZE: usize = 0x0000_4000;
const MAX_CARTRIDGE_SIZE: usize = 32 * 1024 * 1024;

fn main() {
    #[cfg(feature = "logger")]
    init_logger(LogKind::STDOUT);

    let Some(cartridge_path) = std::env::args().nth(1) else {
        eprintln!("usage: gba-emu <cartridge.gba>");
        std::process::exit(-1);
    };

    let bios = load_bios(BIOS_PATH).unwrap_or_else(|err| {
        log(format!("failed to load BIOS from {BIOS_PATH}: {err}"));
        eprintln!("failed to load BIOS from {BIOS_PATH}: {err}");
        std::process::exit(1);
    });

    let cartridge = load_cartridge(&cartridge_path).unwrap_or_else(|err| {
        log(format!("failed to load cartridge {cartridge_path}: {err}"));
        eprintln!("failed to load cartridge {cartridge_path}: {err}");
        std::process::exit(1);
    });

    let mut gba = Gba::new(bios, &cartridge).unwrap_or_else(|err| {
        log(format!("failed to initialize core: {err}"));
        eprintln!("failed to initialize core: {err}");
        std::process::exit(1);
    });

    let shutdown_requested = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&shutdown_requested);
    ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst))
        .expect("failed to install Ctrl+C handler");

    log(format!("running {cartridge_path}"));

    // Categories 2-4 of the error taxonomy (decode errors, execute errors,
    // unimplemented instructions) currently surface as panics from deep
    // inside the CPU core; catch them at this boundary so the process exits
    // with a diagnostic instead of an unwind through `main`.
    let run_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        while !shutdown_requested.load(Ordering::SeqCst) {
            gba.step();
        }
    }));

    match run_result {
        Ok(()) => {
            log("shutdown requested, exiting cleanly");
            std::process::exit(0);
        }
        Err(_) => {
            eprintln!("core terminated on a decode or execute error");
            std::process::exit(2);
        }
    }
}

fn load_bios(path: &str) -> Result<[u8; BIOS_SIZE], String> {
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    if bytes.len() != BIOS_SIZE {
        return Err(format!(
            "expected a {BIOS_SIZE}-byte BIOS image, got {} bytes",
            bytes.len()
        ));
    }

    let mut bios = [0u8; BIOS_SIZE];
    bios.copy_from_slice(&bytes);
    Ok(bios)
}

fn load_cartridge(path: impl AsRef<Path>) -> Result<Vec<u8>, String> {
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    if bytes.len() > MAX_CARTRIDGE_SIZE {
        return Err(format!(
            "cartridge image is {} bytes, exceeding the {MAX_CARTRIDGE_SIZE}-byte limit",
            bytes.len()
        ));
    }
    Ok(bytes)
}
