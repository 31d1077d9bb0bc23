// src/scope.rs
// =============================================================================
// Decides which IPv4 addresses and blocks belong on the public internet.
//
// Two questions are answered here:
// - Is this single address globally routable? (used per host)
// - Is this /24 worth expanding at all? (used per subnet)
//
// A block counts as private/loopback/link-local/multicast only when BOTH its
// network and broadcast addresses are. A /24 that merely overlaps a tiny
// reserved range (e.g. 192.0.0.0/29) stays in scope and its hosts are then
// filtered one by one with is_global().
// =============================================================================

use ipnetwork::Ipv4Network;
use once_cell::sync::Lazy;
use std::net::Ipv4Addr;

// Special-purpose ranges that are never reachable on the public internet.
const PRIVATE_RANGES: &[&str] = &[
    "0.0.0.0/8",          // "this" network
    "10.0.0.0/8",         // RFC1918
    "127.0.0.0/8",        // loopback
    "169.254.0.0/16",     // link-local
    "172.16.0.0/12",      // RFC1918
    "192.0.0.0/29",       // IETF protocol assignments
    "192.0.0.170/31",     // NAT64/DNS64 discovery
    "192.0.2.0/24",       // TEST-NET-1
    "192.168.0.0/16",     // RFC1918
    "198.18.0.0/15",      // benchmarking
    "198.51.100.0/24",    // TEST-NET-2
    "203.0.113.0/24",     // TEST-NET-3
    "240.0.0.0/4",        // reserved
    "255.255.255.255/32", // limited broadcast
];

static PRIVATE_NETWORKS: Lazy<Vec<Ipv4Network>> = Lazy::new(|| parse_ranges(PRIVATE_RANGES));

// Carrier-grade NAT. Not private, but not global either.
static SHARED_ADDRESS_SPACE: Lazy<Vec<Ipv4Network>> = Lazy::new(|| parse_ranges(&["100.64.0.0/10"]));

static MULTICAST: Lazy<Vec<Ipv4Network>> = Lazy::new(|| parse_ranges(&["224.0.0.0/4"]));
static LOOPBACK: Lazy<Vec<Ipv4Network>> = Lazy::new(|| parse_ranges(&["127.0.0.0/8"]));
static LINK_LOCAL: Lazy<Vec<Ipv4Network>> = Lazy::new(|| parse_ranges(&["169.254.0.0/16"]));

fn parse_ranges(ranges: &[&str]) -> Vec<Ipv4Network> {
    ranges.iter().filter_map(|cidr| cidr.parse().ok()).collect()
}

fn in_any(networks: &[Ipv4Network], addr: Ipv4Addr) -> bool {
    networks.iter().any(|net| net.contains(addr))
}

pub fn is_private(addr: Ipv4Addr) -> bool {
    in_any(&PRIVATE_NETWORKS, addr)
}

pub fn is_multicast(addr: Ipv4Addr) -> bool {
    in_any(&MULTICAST, addr)
}

pub fn is_loopback(addr: Ipv4Addr) -> bool {
    in_any(&LOOPBACK, addr)
}

pub fn is_link_local(addr: Ipv4Addr) -> bool {
    in_any(&LINK_LOCAL, addr)
}

/// True when the address is usable on the public internet.
pub fn is_global(addr: Ipv4Addr) -> bool {
    !is_private(addr) && !is_multicast(addr) && !in_any(&SHARED_ADDRESS_SPACE, addr)
}

// Applies an address predicate to a whole block: the block has the property
// only if both of its ends do
fn block_is(net: Ipv4Network, predicate: fn(Ipv4Addr) -> bool) -> bool {
    predicate(net.network()) && predicate(net.broadcast())
}

/// True when a block should be expanded into host records.
///
/// Mirrors the per-address predicates at block level: a subnet is in scope
/// when it is not multicast, not private, not loopback and not link-local.
pub fn subnet_in_scope(net: Ipv4Network) -> bool {
    !block_is(net, is_multicast)
        && !block_is(net, is_private)
        && !block_is(net, is_loopback)
        && !block_is(net, is_link_local)
}
