//! Full-stack exchange against the in-memory mock device.
//!
//! Run with:
//!   cargo run -p apdulink --example mock-exchange --features mock

use apdulink::frame::Reassembly;
use apdulink::session::{split_status, Admin, MockRegistry, SessionConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let registry = MockRegistry::new().with_responder(|command| {
        // Echo the command body back, followed by 9000.
        let mut response = command.get(5..).unwrap_or_default().to_vec();
        response.extend_from_slice(&[0x90, 0x00]);
        response
    });
    let admin = Admin::new(registry).with_session_config(SessionConfig {
        reassembly: Reassembly::DeclaredLength,
        ..SessionConfig::default()
    });

    eprintln!("{} device(s)", admin.count_devices()?);
    let session = admin.connect(0)?;

    let mut command = vec![0x80, 0x02, 0x00, 0x00, 0x80];
    command.extend((0..0x80u8).map(|b| b.wrapping_mul(3) | 1));
    let response = session.exchange(&command)?;

    match split_status(&response) {
        Some((data, sw)) => eprintln!("received {} data bytes, SW {sw}", data.len()),
        None => eprintln!("response without status word"),
    }
    session.close()?;
    Ok(())
}
