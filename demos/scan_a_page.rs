use std::io::{BufRead, BufReader, Write};
use std::time::Duration;

use sane_net::device::scan::Frame;
use sane_net::enums::FrameType;
use sane_net::{DeviceDescriptor, Image, Session};

const OUTPUT_FILE: &str = "./page.pam";

/// Prompts for a scanner device and scans one page, saving it at
/// `./page.pam` in [Netpbm PAM] file format. PAM is a very simple
/// uncompressed format that doesn't need an external library to encode,
/// keeping this demo self-contained.
///
/// To convert this file, you could use FFMPEG as follows:
/// ```sh
/// ffmpeg -i page.pam page.png
/// ```
///
/// [Netpbm PAM]: https://netpbm.sourceforge.net/doc/pam.html#visual
fn main() -> Result<(), sane_net::Error> {
    let addr = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1:6566".into());
    let session = Session::connect(addr, Duration::from_secs(5), None)?;

    println!("Protocol version: {}", sane_net::PROTOCOL_VERSION);

    let devices = session.list_devices()?;
    let device_info = ask_for_device(&devices);

    println!("Scanning with device {}", device_info.name);

    let device = session.device(&device_info.name)?;
    let image = device.acquire_image(None)?;

    println!("Acquired {}x{} image across {} frame(s)", image.width, image.height, image.frames.len());

    if let Err(err) = write_pam_image(&image, OUTPUT_FILE) {
        println!("Failed to write image to {OUTPUT_FILE}: {err}");
    }

    Ok(())
}

fn write_pam_image(image: &Image, path: impl AsRef<std::path::Path>) -> std::io::Result<()> {
    let mut out_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;

    let (depth, pam_tupletype, data) = match image.frames.as_slice() {
        [frame] if frame.frame_type == FrameType::Gray => {
            let tupletype = if image.depth_per_pixel == 1 { "BLACKANDWHITE" } else { "GRAYSCALE" };
            (1, tupletype, frame.data.clone())
        }
        [frame] if frame.frame_type == FrameType::Rgb => (3, "RGB", frame.data.clone()),
        [red, green, blue] => (3, "RGB", interleave_rgb(red, green, blue, image.depth_per_pixel)),
        _ => return Err(std::io::Error::other("unsupported frame composition")),
    };

    let maxval: u32 = if image.depth_per_pixel == 1 {
        1
    } else {
        (1u32 << image.depth_per_pixel) - 1
    };

    write!(
        out_file,
        "P7\n\
				WIDTH {width}\n\
				HEIGHT {height}\n\
				DEPTH {depth}\n\
				MAXVAL {maxval}\n\
				TUPLETYPE {pam_tupletype}\n\
				ENDHDR\n",
        width = image.width,
        height = image.height,
    )?;

    out_file.write_all(&data)
}

/// Planar `RED,GREEN,BLUE` frames (already reordered by the assembler) need
/// to be interleaved sample-by-sample into PAM's chunky RGB layout.
fn interleave_rgb(red: &Frame, green: &Frame, blue: &Frame, depth_per_pixel: i32) -> Vec<u8> {
    let sample_size = if depth_per_pixel > 8 { 2 } else { 1 };
    let mut out = Vec::with_capacity(red.data.len() * 3);
    for chunk in (0..red.data.len()).step_by(sample_size) {
        out.extend_from_slice(&red.data[chunk..chunk + sample_size]);
        out.extend_from_slice(&green.data[chunk..chunk + sample_size]);
        out.extend_from_slice(&blue.data[chunk..chunk + sample_size]);
    }
    out
}

fn ask_for_device(devices: &[DeviceDescriptor]) -> &DeviceDescriptor {
    if devices.is_empty() {
        println!("No devices available.");
        std::process::exit(0);
    }

    println!("Pick a device from the list:");
    for (i, dev) in devices.iter().enumerate() {
        println!("{}. {} ({})", i + 1, dev.model, dev.name);
    }
    loop {
        let input = prompt("Device number: ");
        match input.parse() {
            Ok(n) if (1..=devices.len()).contains(&n) => break &devices[n - 1],
            Ok(_) => println!("Not a device. Try again."),
            Err(_) => println!("Not a number. Try again."),
        }
    }
}

fn prompt(msg: &str) -> String {
    print!("{}", msg);
    std::io::stdout().flush().unwrap();
    let line = BufReader::new(std::io::stdin())
        .lines()
        .next()
        .expect("stdin closed");
    line.unwrap()
}
