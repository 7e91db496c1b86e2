//! Ask the first HID device of a vendor for its application version.
//!
//! Run with:
//!   cargo run -p apdulink --example get-version --features hid -- 2c97

use apdulink::frame::Reassembly;
use apdulink::session::{split_status, Admin, SessionConfig};
use apdulink::transport::{DeviceFilter, HidRegistry};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let vendor = std::env::args().nth(1).unwrap_or_else(|| "2c97".to_string());
    let vendor = u16::from_str_radix(vendor.trim_start_matches("0x"), 16)?;

    let admin = Admin::new(HidRegistry::new()?)
        .with_filter(DeviceFilter::vendor(vendor))
        .with_session_config(SessionConfig {
            reassembly: Reassembly::DeclaredLength,
            ..SessionConfig::default()
        });

    let devices = admin.list_devices()?;
    for (index, device) in devices.iter().enumerate() {
        eprintln!("[{index}] {device}");
    }

    let session = admin.connect(0)?;
    let response = session.exchange(&[0xB0, 0x01, 0x00, 0x00, 0x00])?;
    match split_status(&response) {
        Some((data, sw)) => println!("{} SW {sw}", hex::encode(data)),
        None => println!("short response: {}", hex::encode(&response)),
    }
    session.close()?;
    Ok(())
}
