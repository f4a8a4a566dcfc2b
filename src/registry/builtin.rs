//! Built-in route tables.
//!
//! Two static modules are always mounted: the Termux:API capability routes
//! (non-root) and the root routes, which wrap their commands in `su -c` and
//! are therefore marked privileged. Actions with side effects answer to
//! POST; pure reads stay on GET.

use super::{CommandDescriptor, ModuleDescriptor};
use axum::http::Method;
use std::sync::Arc;
use std::time::Duration;

/// Routes backed by the Termux:API tools. No elevated privileges needed.
pub fn termux_module() -> ModuleDescriptor {
    let commands = vec![
        CommandDescriptor::shell(
            "battery",
            Method::GET,
            "termux-battery-status",
            "Battery status as reported by Termux:API.",
        ),
        CommandDescriptor::shell(
            "device-info",
            Method::GET,
            "termux-api-info",
            "Detailed device information.",
        ),
        CommandDescriptor::shell(
            "contact-list",
            Method::GET,
            "termux-contact-list",
            "Contacts stored on the device.",
        ),
        CommandDescriptor::shell(
            "vibrate",
            Method::POST,
            "termux-vibrate -d 500",
            "Vibrate the device for 500ms.",
        ),
        CommandDescriptor::shell(
            "flashlight/on",
            Method::POST,
            "termux-torch on",
            "Turn the flashlight on.",
        ),
        CommandDescriptor::shell(
            "flashlight/off",
            Method::POST,
            "termux-torch off",
            "Turn the flashlight off.",
        ),
    ];

    ModuleDescriptor {
        name: "termux".to_string(),
        display_name: "Termux API".to_string(),
        description: "Non-root device capabilities via Termux:API.".to_string(),
        base_path: "/api/termux".to_string(),
        commands: commands.into_iter().map(Arc::new).collect(),
    }
}

/// Routes that require root. Every command runs under `su -c`, and the
/// whole module is unreachable in read-only mode.
pub fn root_module() -> ModuleDescriptor {
    let commands = vec![
        CommandDescriptor::shell(
            "whoami",
            Method::GET,
            "su -c 'whoami'",
            "Check which user commands run as (should be root).",
        )
        .privileged(),
        CommandDescriptor::shell(
            "reboot",
            Method::POST,
            "su -c 'reboot'",
            "Reboot the device.",
        )
        .privileged(),
        CommandDescriptor::shell(
            "shutdown",
            Method::POST,
            // -p powers the device off instead of restarting it.
            "su -c 'reboot -p'",
            "Shut the device down.",
        )
        .privileged(),
        CommandDescriptor::shell(
            "wifi/scan",
            Method::GET,
            // Assumes the standard wlan0 interface; scanning can take a
            // while, hence the raised budget.
            "su -c 'iw dev wlan0 scan'",
            "Scan for nearby Wi-Fi networks.",
        )
        .privileged()
        .with_timeout(Duration::from_secs(15)),
        CommandDescriptor::shell(
            "wifi/enable",
            Method::POST,
            "su -c 'svc wifi enable'",
            "Enable the Wi-Fi interface.",
        )
        .privileged(),
        CommandDescriptor::shell(
            "wifi/disable",
            Method::POST,
            "su -c 'svc wifi disable'",
            "Disable the Wi-Fi interface.",
        )
        .privileged(),
        CommandDescriptor::shell(
            "bluetooth/scan",
            Method::GET,
            // bluetoothctl never exits on its own; bound the scan itself.
            "su -c 'timeout 8s bluetoothctl scan on'",
            "Scan for nearby Bluetooth devices for 8 seconds.",
        )
        .privileged(),
        CommandDescriptor::shell(
            "nfc/enable",
            Method::POST,
            "su -c 'svc nfc enable'",
            "Enable the NFC interface.",
        )
        .privileged(),
        CommandDescriptor::shell(
            "nfc/disable",
            Method::POST,
            "su -c 'svc nfc disable'",
            "Disable the NFC interface.",
        )
        .privileged(),
        CommandDescriptor::shell(
            "dmesg",
            Method::GET,
            "su -c 'dmesg | tail -n 20'",
            "Last 20 lines of the kernel message buffer.",
        )
        .privileged(),
        CommandDescriptor::shell(
            "logcat",
            Method::GET,
            "su -c 'logcat -d -t 20'",
            "Last 20 lines of the Android logcat.",
        )
        .privileged()
        .with_timeout(Duration::from_secs(15)),
        CommandDescriptor::shell(
            "processes",
            Method::GET,
            "su -c 'ps -ef'",
            "List all running processes.",
        )
        .privileged(),
        CommandDescriptor::shell(
            "ls-root",
            Method::GET,
            "su -c 'ls -la /'",
            "List the contents of the root directory.",
        )
        .privileged(),
    ];

    ModuleDescriptor {
        name: "root".to_string(),
        display_name: "Root Control".to_string(),
        description: "Privileged device control. Use with caution.".to_string(),
        base_path: "/api/root".to_string(),
        commands: commands.into_iter().map(Arc::new).collect(),
    }
}
