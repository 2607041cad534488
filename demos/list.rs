use jaylink_host::*;
use std::fmt::Write;

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let context = Context::new()?;
    let list = context.device_list()?;
    println!(
        "Found {} J-Link device{}.",
        list.len(),
        if list.len() == 1 { "" } else { "s" },
    );

    for device in &list {
        println!();
        println!(
            "Bus {:03} Address {:03}: Serial {}, {:?}, J-Link USB address {}",
            device.bus_number(),
            device.device_address(),
            device.serial_number(),
            device.variant(),
            device.usb_address(),
        );

        // Print detailed information read from the device
        let info = match device.open().and_then(|mut handle| detailed_info(&mut handle)) {
            Ok(info) => info,
            Err(e) => format!("<{}>", e),
        };

        // This is multi-line info
        for (i, line) in info.lines().enumerate() {
            if i == 0 {
                print!("⤷ ");
            } else {
                print!("  ");
            }

            println!("{}", line);
        }
    }

    Ok(())
}

fn detailed_info(handle: &mut DeviceHandle) -> Result<String> {
    let caps = handle.capabilities()?;
    let firmware = handle.firmware_version()?;
    let status = handle.hardware_status()?;

    let mut info = String::new();
    writeln!(info, "Firmware: {}", firmware).unwrap();
    writeln!(info, "Capabilities: {:?}", caps).unwrap();
    if caps.contains(Capability::GetHwVersion) {
        writeln!(info, "HW Version: {}", handle.hardware_version()?).unwrap();
    }
    if caps.contains(Capability::SpeedInfo) {
        let speeds = handle.speeds()?;
        writeln!(info, "Max. Speed: {} kHz", speeds.max_speed() / 1000).unwrap();
    }
    if caps.contains(Capability::GetFreeMemory) {
        writeln!(info, "Free memory: {} bytes", handle.free_memory()?).unwrap();
    }
    writeln!(info, "VTref: {} V", status.target_voltage() as f32 / 1000.0).unwrap();
    if caps.contains(Capability::SelectTargetInterface) {
        let selected = handle.selected_interface()?;
        writeln!(info, "Interfaces:").unwrap();
        for interface in handle.available_interfaces()?.iter() {
            let marker = if interface == selected { " (selected)" } else { "" };
            writeln!(info, "    - {}{}", interface, marker).unwrap();
        }
    }

    Ok(info)
}
