use std::{env, process, time::Duration};

use sdi12_irrigation::{
    cycle::{CycleConfig, RelayBindings, Runner},
    relay::RelayOutput,
    serial::SerialTransport,
    Calibration, CancelToken, VolumetricWaterContent,
};

/// Stand-in for a real GPIO output; logs the level transitions instead.
struct LoggedRelay {
    pin: u8,
}

impl RelayOutput for LoggedRelay {
    fn set_high(&mut self) -> std::io::Result<()> {
        log::info!("Relay pin {} HIGH", self.pin);
        Ok(())
    }

    fn set_low(&mut self) -> std::io::Result<()> {
        log::info!("Relay pin {} LOW", self.pin);
        Ok(())
    }
}

fn main() {
    let mut logger_builder = env_logger::Builder::new();
    if let Ok(rust_log) = env::var("RUST_LOG") {
        println!("Parsing RUST_LOG={}", rust_log);
        logger_builder.parse_filters(&rust_log);
    }
    logger_builder.init();

    let tty_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "/dev/ttyUSB0".to_owned());
    // Sensor addresses and the relay pins wired to their pots.
    let wiring: &[(char, u8)] = &[('1', 18), ('2', 19)];

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .expect("failed to register the interrupt handler");

    let mut transport = match SerialTransport::open_path(&tty_path) {
        Ok(transport) => transport,
        Err(err) => {
            log::error!("Failed to open {}: {}", tty_path, err);
            process::exit(1);
        }
    };

    let mut relays = RelayBindings::from_pairs(
        wiring
            .iter()
            .map(|&(address, pin)| (address, LoggedRelay { pin })),
    );
    if relays.is_empty() {
        log::error!("No valid sensor addresses configured");
        process::exit(1);
    }

    let config = CycleConfig {
        total_data_points: 10,
        delay_between_points: Duration::from_secs(60),
        vwc_threshold: VolumetricWaterContent::from_percent(20.0),
        irrigation_hold: CycleConfig::DEFAULT_IRRIGATION_HOLD,
        calibration: Calibration::default(),
        utc_timestamps: true,
    };

    let mut runner = Runner::new(&mut transport, &mut relays, config, cancel);
    if let Err(err) = runner.identify_all() {
        log::error!("Sensor setup failed: {}", err);
        process::exit(1);
    }

    let result = runner.run(|point| {
        // Stand-in for the CSV/telemetry collaborators.
        for (address, reading) in &point.readings {
            println!(
                "{},{},{:.1},{:.1}",
                point.timestamp,
                address,
                reading.temperature.as_celsius(),
                reading.water_content.as_percent()
            );
        }
    });
    if let Err(err) = result {
        log::error!("Run aborted: {}", err);
        process::exit(1);
    }
}
