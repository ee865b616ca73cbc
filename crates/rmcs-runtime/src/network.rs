//! Network interface inventory: link stats and IO counters from
//! `/sys/class/net`, addresses from `getifaddrs(3)`.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

use rmcs_core::Result;

const SYS_CLASS_NET: &str = "/sys/class/net";
const ZERO_MAC: &str = "00:00:00:00:00:00";

#[cfg(target_os = "linux")]
const AF_LINK_FAMILY: i32 = libc::AF_PACKET;
#[cfg(not(target_os = "linux"))]
const AF_LINK_FAMILY: i32 = -1;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NicInfo {
    pub nic: String,
    pub stats: NicStats,
    pub io: NicIo,
    pub addrs: NicAddrs,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NicStats {
    /// Link speed in Mbit/s; 0 when unknown.
    pub speed: f64,
    pub up: bool,
    pub mtu: Option<u32>,
    pub duplex: Option<String>,
}

impl Default for NicStats {
    fn default() -> Self {
        Self {
            speed: 0.0,
            up: false,
            mtu: None,
            duplex: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct NicIo {
    pub incoming: f64,
    pub outgoing: f64,
    pub incoming_errs: f64,
    pub outgoing_errs: f64,
    pub incoming_drops: f64,
    pub outgoing_drops: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AddrInfo {
    pub address: String,
    pub netmask: Option<String>,
    pub broadcast: Option<String>,
    pub family: i32,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct NicAddrs {
    pub ipv4: Option<AddrInfo>,
    pub ipv6: Option<AddrInfo>,
    pub mac: Option<AddrInfo>,
    pub unknown: Vec<AddrInfo>,
}

impl NicInfo {
    fn named(nic: &str) -> Self {
        Self {
            nic: nic.to_string(),
            stats: NicStats::default(),
            io: NicIo::default(),
            addrs: NicAddrs::default(),
        }
    }
}

/// Every interface on this machine, keyed by name.
pub fn snapshot() -> Result<BTreeMap<String, NicInfo>> {
    #[allow(unused_mut)]
    let mut nics = read_sysfs(Path::new(SYS_CLASS_NET));

    #[cfg(unix)]
    for (name, addrs) in ifaddrs::interface_addresses()? {
        let nic = nics
            .entry(name.clone())
            .or_insert_with(|| NicInfo::named(&name));
        for addr in addrs {
            classify(&mut nic.addrs, addr);
        }
    }

    debug!(count = nics.len(), "collected network interfaces");
    Ok(nics)
}

/// Read link stats, IO counters and MAC for each interface under `root`.
pub fn read_sysfs(root: &Path) -> BTreeMap<String, NicInfo> {
    let mut nics = BTreeMap::new();
    let Ok(entries) = std::fs::read_dir(root) else {
        return nics;
    };

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        let dir = entry.path();
        let mut nic = NicInfo::named(&name);

        let flags = read_trimmed(&dir.join("flags"))
            .and_then(|f| u32::from_str_radix(f.trim_start_matches("0x"), 16).ok())
            .unwrap_or(0);
        nic.stats = NicStats {
            speed: read_number(&dir.join("speed")).filter(|s| *s > 0.0).unwrap_or(0.0),
            up: flags & 0x1 != 0,
            mtu: read_trimmed(&dir.join("mtu")).and_then(|m| m.parse().ok()),
            duplex: Some(match read_trimmed(&dir.join("duplex")).as_deref() {
                Some("full") => "full".to_string(),
                Some("half") => "half".to_string(),
                _ => "unknown".to_string(),
            }),
        };

        let stat = |file: &str| read_number(&dir.join("statistics").join(file)).unwrap_or(0.0);
        nic.io = NicIo {
            incoming: stat("rx_bytes"),
            outgoing: stat("tx_bytes"),
            incoming_errs: stat("rx_errors"),
            outgoing_errs: stat("tx_errors"),
            incoming_drops: stat("rx_dropped"),
            outgoing_drops: stat("tx_dropped"),
        };

        if let Some(mac) = read_trimmed(&dir.join("address")).filter(|m| !m.is_empty()) {
            nic.addrs.mac = Some(AddrInfo {
                address: mac,
                netmask: None,
                broadcast: read_trimmed(&dir.join("broadcast")),
                family: AF_LINK_FAMILY,
            });
        }

        nics.insert(name, nic);
    }
    nics
}

fn read_trimmed(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
}

fn read_number(path: &Path) -> Option<f64> {
    read_trimmed(path).and_then(|s| s.parse::<f64>().ok())
}

/// First address per family wins; anything unrecognised is kept in `unknown`.
fn classify(addrs: &mut NicAddrs, addr: AddrInfo) {
    let slot = match addr.family {
        f if f == AF_INET => &mut addrs.ipv4,
        f if f == AF_INET6 => &mut addrs.ipv6,
        f if f == AF_LINK_FAMILY => &mut addrs.mac,
        _ => {
            addrs.unknown.push(addr);
            return;
        }
    };
    if slot.is_none() {
        *slot = Some(addr);
    }
}

#[cfg(unix)]
const AF_INET: i32 = libc::AF_INET;
#[cfg(unix)]
const AF_INET6: i32 = libc::AF_INET6;
#[cfg(not(unix))]
const AF_INET: i32 = 2;
#[cfg(not(unix))]
const AF_INET6: i32 = 23;

/// The MAC used to identify this machine.
///
/// Prefers physical-looking interfaces, then any non-zero MAC, then a random
/// identifier.
pub fn primary_mac() -> String {
    let nics = match snapshot() {
        Ok(nics) => nics,
        Err(e) => {
            warn!(error = %e, "cannot enumerate interfaces");
            BTreeMap::new()
        }
    };
    pick_mac(&nics).unwrap_or_else(|| {
        let fallback = uuid::Uuid::new_v4().to_string();
        warn!(fallback = %fallback, "no usable MAC address, using a random identifier");
        fallback
    })
}

/// Choose a MAC from an inventory, skipping loopback and container links first.
pub fn pick_mac(nics: &BTreeMap<String, NicInfo>) -> Option<String> {
    let usable = |nic: &NicInfo| {
        nic.addrs
            .mac
            .as_ref()
            .map(|m| m.address.clone())
            .filter(|m| !m.is_empty() && m != ZERO_MAC)
    };

    let preferred = nics
        .values()
        .filter(|nic| !["lo", "docker", "veth"].iter().any(|p| nic.nic.starts_with(p)))
        .find_map(usable);
    if preferred.is_some() {
        return preferred;
    }

    let fallback = nics.values().find_map(usable);
    if let Some(mac) = &fallback {
        warn!(mac = %mac, "using fallback MAC address");
    }
    fallback
}

#[cfg(unix)]
mod ifaddrs {
    use std::collections::BTreeMap;
    use std::ffi::CStr;
    use std::net::{Ipv4Addr, Ipv6Addr};

    use super::AddrInfo;

    pub(super) fn interface_addresses() -> std::io::Result<BTreeMap<String, Vec<AddrInfo>>> {
        let mut head: *mut libc::ifaddrs = std::ptr::null_mut();
        // SAFETY: on success the list is owned by us until freeifaddrs below.
        if unsafe { libc::getifaddrs(&mut head) } != 0 {
            return Err(std::io::Error::last_os_error());
        }

        let mut out: BTreeMap<String, Vec<AddrInfo>> = BTreeMap::new();
        let mut cur = head;
        while !cur.is_null() {
            // SAFETY: `cur` is a non-null node of the list returned above.
            let ifa = unsafe { &*cur };
            let name = unsafe { CStr::from_ptr(ifa.ifa_name) }
                .to_string_lossy()
                .into_owned();
            let entry = out.entry(name).or_default();

            // SAFETY: pointers come from getifaddrs and are null or valid sockaddrs.
            if let Some(address) = unsafe { sockaddr_to_string(ifa.ifa_addr) } {
                let family = unsafe { (*ifa.ifa_addr).sa_family } as i32;
                let netmask = unsafe { sockaddr_to_string(ifa.ifa_netmask) };
                let broadcast = if ifa.ifa_flags & libc::IFF_BROADCAST as u32 != 0 {
                    unsafe { sockaddr_to_string(broadcast_ptr(ifa)) }
                } else {
                    None
                };
                entry.push(AddrInfo {
                    address,
                    netmask,
                    broadcast,
                    family,
                });
            }
            cur = ifa.ifa_next;
        }

        // SAFETY: `head` came from a successful getifaddrs call.
        unsafe { libc::freeifaddrs(head) };
        Ok(out)
    }

    #[cfg(target_os = "linux")]
    fn broadcast_ptr(ifa: &libc::ifaddrs) -> *mut libc::sockaddr {
        ifa.ifa_ifu
    }

    #[cfg(not(target_os = "linux"))]
    fn broadcast_ptr(ifa: &libc::ifaddrs) -> *mut libc::sockaddr {
        ifa.ifa_dstaddr
    }

    /// IPv4/IPv6 only; link-layer entries are read from sysfs instead.
    unsafe fn sockaddr_to_string(sa: *const libc::sockaddr) -> Option<String> {
        if sa.is_null() {
            return None;
        }
        match unsafe { (*sa).sa_family } as i32 {
            libc::AF_INET => {
                let sin = unsafe { &*(sa as *const libc::sockaddr_in) };
                Some(Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)).to_string())
            }
            libc::AF_INET6 => {
                let sin6 = unsafe { &*(sa as *const libc::sockaddr_in6) };
                Some(Ipv6Addr::from(sin6.sin6_addr.s6_addr).to_string())
            }
            _ => None,
        }
    }
}
