// Linux-specific helpers: /sys/class/net device attributes.

/// ARPHRD_LOOPBACK from <linux/if_arp.h>.
const ARPHRD_LOOPBACK: u16 = 772;

/// Read the ARP hardware type from /sys/class/net/<interface>/type (Linux).
pub(super) fn read_link_type(interface_name: &str) -> Option<u16> {
    #[cfg(target_os = "linux")]
    {
        let path = format!("/sys/class/net/{}/type", interface_name);
        if let Ok(content) = std::fs::read_to_string(&path) {
            return content.trim().parse().ok();
        }
    }
    None
}

/// Loopback by name, or by link type where sysfs is available.
pub(super) fn is_loopback(interface_name: &str) -> bool {
    let lower = interface_name.to_ascii_lowercase();
    lower == "lo"
        || lower.starts_with("loopback")
        || read_link_type(interface_name) == Some(ARPHRD_LOOPBACK)
}
