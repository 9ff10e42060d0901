use std::time::Duration;

use sane_net::Session;

fn main() -> Result<(), sane_net::Error> {
    let addr = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1:6566".into());
    let session = Session::connect(addr, Duration::from_secs(5), None)?;

    println!("Protocol version: {}", sane_net::PROTOCOL_VERSION);

    let devices = session.list_devices()?;
    println!("{devices:#?}");

    Ok(())
}
