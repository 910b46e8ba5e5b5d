// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! End-to-end scenarios S1-S6 (spec §8), exercised against the public
//! [`FibCore`] API with the mock HAL/LPM/event-sink from [`hfib_core::testing`],
//! exactly as an external embedder would drive this crate. Scenarios S2/S3, which
//! the spec states at 500,000 and 800,000 routes to make a point about O(1)
//! convergence cost, are exercised here at a much smaller N: the property under
//! test (call counts, not wall-clock) does not depend on N.

use hfib_core::config::FibCoreConfig;
use hfib_core::event::FibEvent;
use hfib_core::frr::Branch;
use hfib_core::lpm::Change;
use hfib_core::orchestrate::{FibCore, LinkTarget};
use hfib_core::route::{ProtocolId, RouteKey};
use hfib_core::store::object::{
    AddressFamily, DirectNextHop, EcmpGroup, FrrProtected, HashMode, Label, LabelOp, LabelOperation,
    ProtectionKind, RecursiveNextHop, ResolutionObject, RouteId,
};
use hfib_core::testing::{HalCall, MockEventSink, MockHal, MockLpm};
use hfib_core::RevertivePolicy;
use net::{Mac, Prefix, Vlan};
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

fn mac(last: u8) -> Mac {
    Mac([0x00, 0x11, 0x22, 0x33, 0x44, last])
}

fn new_core(config: FibCoreConfig) -> FibCore<MockHal, MockLpm, MockEventSink> {
    FibCore::new(config, MockHal::new(), MockLpm::new(), MockEventSink::new())
}

fn route_key(prefix: &str) -> RouteKey {
    RouteKey::new(Prefix::from_str(prefix).unwrap(), ProtocolId::Bgp, 20)
}

fn direct_next_hop(dst: Mac, port: u32) -> ResolutionObject {
    ResolutionObject::DirectNextHop(DirectNextHop {
        dst_mac: dst,
        src_mac: Mac([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]),
        vlan: Vlan::from_u16(100).unwrap(),
        egress_port: port,
        reachable: true,
    })
}

/// S1 - L3VPN install, forward walk, program.
#[test]
fn s1_l3vpn_install_forward_walk_and_program() {
    let mut core = new_core(FibCoreConfig::default());

    let h1 = core.store_mut().insert(direct_next_hop(mac(0x55), 10)).unwrap();

    let rnh_addr = IpAddr::V4(Ipv4Addr::new(10, 255, 0, 5));
    let lpm_route_id = RouteId::new_static("s1-vpn-label-resolver");
    core.lpm().set_route(rnh_addr, 32, h1, lpm_route_id);

    let h3 = core
        .store_mut()
        .insert(ResolutionObject::RecursiveNextHop(RecursiveNextHop {
            family: AddressFamily::Ipv4,
            address: rnh_addr,
            resolved_to: None,
            recursion_depth: 0,
            resolving_route_id: None,
        }))
        .unwrap();

    // TE tunnel label, then VPN label, chained per spec S1.
    let h4 = core
        .store_mut()
        .insert(ResolutionObject::LabelOperation(LabelOperation {
            op: LabelOp::Push,
            labels: vec![Label::new(50_000, 0, 255)],
            next: Some(h3),
        }))
        .unwrap();
    let h5 = core
        .store_mut()
        .insert(ResolutionObject::LabelOperation(LabelOperation {
            op: LabelOp::Push,
            labels: vec![Label::new(100_200, 0, 255)],
            next: Some(h4),
        }))
        .unwrap();

    let key = route_key("192.168.1.0/24");
    core.install_route(key, h5).unwrap();

    let route = core.route(&key).expect("route was installed");
    assert!(route.active, "route must be active once fully resolved");

    let assembly = hfib_core::walk::forward::forward_walk(core.store(), h5, 10).unwrap();
    assert!(!assembly.unresolved);
    assert_eq!(assembly.labels.iter().map(|l| l.label_value).collect::<Vec<_>>(), vec![100_200, 50_000]);
    let terminal = assembly.terminal.expect("walk must reach the terminal DirectNextHop");
    assert_eq!(terminal.dst_mac, mac(0x55));
    assert_eq!(terminal.egress_port, 10);

    // HAL receives: alloc+program L2-EEDB, then alloc+program two label-EEDBs
    // (deepest label first), then alloc+program FEC.
    let calls = core.hal().calls();
    assert!(matches!(calls[0], HalCall::AllocEedb(_)));
    assert!(matches!(calls[1], HalCall::ProgramL2Rewrite(_, _)));
    assert!(matches!(calls[2], HalCall::AllocEedb(_)));
    assert!(matches!(calls[3], HalCall::ProgramLabelEedb(_, _, _)));
    assert!(matches!(calls[4], HalCall::AllocEedb(_)));
    assert!(matches!(calls[5], HalCall::ProgramLabelEedb(_, _, _)));
    assert!(matches!(calls[6], HalCall::AllocFec(_)));
    assert!(matches!(calls[7], HalCall::ProgramFecSimple(_, _, _)));
    assert_eq!(calls.len(), 8);
}

/// S2 - PIC Core convergence: many routes sharing one ECMP group converge in O(1)
/// HAL calls on a single member going down.
#[test]
fn s2_pic_core_convergence_is_o1_in_route_count() {
    const ROUTE_COUNT: usize = 64;

    let mut core = new_core(FibCoreConfig::default());

    let members: Vec<_> = (0..4).map(|i| core.store_mut().insert(direct_next_hop(mac(i), 100 + u32::from(i))).unwrap()).collect();
    let group = core
        .store_mut()
        .insert(ResolutionObject::EcmpGroup(EcmpGroup {
            members: members.iter().map(|&h| Some(h)).collect(),
            member_live: vec![true; members.len()],
            hash_mode: HashMode::L3,
            resilient_table: None,
            max_members: members.len(),
        }))
        .unwrap();

    let rnh_addr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    core.lpm().set_route(rnh_addr, 32, group, RouteId::new_static("s2-igp-group"));
    let rnh = core
        .store_mut()
        .insert(ResolutionObject::RecursiveNextHop(RecursiveNextHop {
            family: AddressFamily::Ipv4,
            address: rnh_addr,
            resolved_to: None,
            recursion_depth: 0,
            resolving_route_id: None,
        }))
        .unwrap();

    for i in 0..ROUTE_COUNT {
        let key = route_key(&format!("10.{}.0.0/24", i));
        core.install_route(key, rnh).unwrap();
    }
    for i in 0..ROUTE_COUNT {
        let key = route_key(&format!("10.{}.0.0/24", i));
        assert!(core.route(&key).unwrap().active);
    }

    let baseline = core.hal().calls().len();
    core.on_link_event(LinkTarget::EcmpMember { group, position: 0 }, false).unwrap();
    let after = &core.hal().calls()[baseline..];

    assert_eq!(after.iter().filter(|c| matches!(c, HalCall::UpdateEcmpMembers(..))).count(), 1);
    assert!(after.iter().all(|c| !matches!(c, HalCall::AllocFec(_) | HalCall::AllocEedb(_))));

    for i in 0..ROUTE_COUNT {
        let key = route_key(&format!("10.{}.0.0/24", i));
        assert!(core.route(&key).unwrap().active, "routes must stay active through member failure");
    }
}

/// S3 - PIC Edge failover: many routes sharing one FRR-protected pair converge in
/// O(1) HAL calls on BFD-down for the primary.
#[test]
fn s3_pic_edge_failover_is_o1_in_route_count() {
    const ROUTE_COUNT: usize = 64;

    let mut core = new_core(FibCoreConfig::default());

    let primary_target = core.store_mut().insert(direct_next_hop(mac(0xA1), 21)).unwrap();
    let backup_target = core.store_mut().insert(direct_next_hop(mac(0xB1), 22)).unwrap();

    let addr_a = IpAddr::V4(Ipv4Addr::new(10, 1, 0, 1));
    let addr_b = IpAddr::V4(Ipv4Addr::new(10, 2, 0, 1));
    core.lpm().set_route(addr_a, 32, primary_target, RouteId::new_static("s3-rnh-a"));
    core.lpm().set_route(addr_b, 32, backup_target, RouteId::new_static("s3-rnh-b"));

    let rnh_a = core
        .store_mut()
        .insert(ResolutionObject::RecursiveNextHop(RecursiveNextHop {
            family: AddressFamily::Ipv4,
            address: addr_a,
            resolved_to: None,
            recursion_depth: 0,
            resolving_route_id: None,
        }))
        .unwrap();
    let rnh_b = core
        .store_mut()
        .insert(ResolutionObject::RecursiveNextHop(RecursiveNextHop {
            family: AddressFamily::Ipv4,
            address: addr_b,
            resolved_to: None,
            recursion_depth: 0,
            resolving_route_id: None,
        }))
        .unwrap();

    let protected = core
        .store_mut()
        .insert(ResolutionObject::FrrProtected(FrrProtected {
            primary: rnh_a,
            backup: rnh_b,
            protection: ProtectionKind::Node,
            state: hfib_core::store::object::FrrState::UsingPrimary,
            detection_ms: 20,
            revertive: RevertivePolicy::NonRevertive,
        }))
        .unwrap();

    for i in 0..ROUTE_COUNT {
        let key = route_key(&format!("10.{}.0.0/24", 100 + i));
        core.install_route(key, protected).unwrap();
    }

    let baseline = core.hal().calls().len();
    core.on_bfd_down(protected, Branch::Primary).unwrap();
    let after = &core.hal().calls()[baseline..];

    assert_eq!(after.iter().filter(|c| matches!(c, HalCall::SetActive(_, hfib_core::hal::Active::Backup))).count(), 1);
    assert!(after.iter().all(|c| !matches!(c, HalCall::AllocFec(_) | HalCall::AllocEedb(_) | HalCall::AllocEcmp(..))));

    for i in 0..ROUTE_COUNT {
        let key = route_key(&format!("10.{}.0.0/24", 100 + i));
        assert!(core.route(&key).unwrap().active);
    }
}

/// S4 - VM migration: make-before-break update swaps a route's hardware handle
/// without ever observing a freed resource in between (I7).
#[test]
fn s4_update_route_is_make_before_break() {
    let mut core = new_core(FibCoreConfig::default());

    let old_target = core.store_mut().insert(direct_next_hop(mac(0x01), 5)).unwrap();
    let key = route_key("172.16.0.0/24");
    core.install_route(key, old_target).unwrap();
    assert!(core.route(&key).unwrap().active);

    let new_target = core.store_mut().insert(direct_next_hop(mac(0x02), 7)).unwrap();
    core.update_route(key, new_target).unwrap();
    assert!(core.route(&key).unwrap().active);
    assert_eq!(core.route(&key).unwrap().root, new_target);

    let calls = core.hal().calls();
    let last_alloc_eedb = calls.iter().rposition(|c| matches!(c, HalCall::AllocEedb(_))).unwrap();
    let first_free = calls.iter().position(|c| matches!(c, HalCall::FreeEedb(_) | HalCall::FreeFec(_)));
    if let Some(first_free) = first_free {
        assert!(last_alloc_eedb < first_free, "new resources must be allocated before old ones are freed");
    }
    assert!(calls.iter().any(|c| matches!(c, HalCall::FreeEedb(_))), "old EEDB must be freed once drain acknowledges");
    assert!(calls.iter().any(|c| matches!(c, HalCall::FreeFec(_))), "old FEC must be freed once drain acknowledges");
    assert!(calls.contains(&HalCall::Drain), "drain must be awaited before freeing old resources");
}

/// S5 - Recursion loop rejection: a recursive next-hop whose LPM answer points back
/// at itself is rejected with `RecursionExceeded`, the route stays installed and
/// unresolved, and no hardware is ever programmed.
#[test]
fn s5_recursion_loop_is_rejected() {
    let mut core = new_core(FibCoreConfig::default());

    let addr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
    let rnh = core
        .store_mut()
        .insert(ResolutionObject::RecursiveNextHop(RecursiveNextHop {
            family: AddressFamily::Ipv4,
            address: addr,
            resolved_to: None,
            recursion_depth: 0,
            resolving_route_id: None,
        }))
        .unwrap();
    // The route covering `addr` is Route X itself: the LPM answer points right back
    // at `rnh`, so re-resolution never terminates within the configured bound.
    core.lpm().set_route(addr, 32, rnh, RouteId::new_static("s5-self-covering-route"));

    let key = route_key("203.0.113.0/24");
    core.install_route(key, rnh).unwrap();

    let route = core.route(&key).expect("route is installed even though unresolved");
    assert!(!route.active, "a recursion-exceeded chain must install inactive, not error out");
    assert!(core.hal().calls().is_empty(), "no HAL programming may occur for an unresolved chain");
    assert!(core.sink().events.iter().any(|e| matches!(e, FibEvent::RecursionExceeded(k, _) if *k == key)));
}

/// A recursive next-hop's re-resolution (driven by `on_route_change`, not install)
/// must reprogram hardware against the *new* target rather than returning the FEC
/// cached for the old one, and must free the resources that mirrored the old target.
#[test]
fn on_route_change_reprograms_recursive_next_hop_against_new_target() {
    let mut core = new_core(FibCoreConfig::default());

    let old_target = core.store_mut().insert(direct_next_hop(mac(0x11), 11)).unwrap();
    let rnh_addr = IpAddr::V4(Ipv4Addr::new(10, 9, 0, 1));
    let igp_route_id = RouteId::new_static("on_route_change_reprograms_recursive_next_hop_against_new_target/igp");
    core.lpm().set_route(rnh_addr, 32, old_target, igp_route_id);

    let rnh = core
        .store_mut()
        .insert(ResolutionObject::RecursiveNextHop(RecursiveNextHop {
            family: AddressFamily::Ipv4,
            address: rnh_addr,
            resolved_to: None,
            recursion_depth: 0,
            resolving_route_id: None,
        }))
        .unwrap();

    let key = route_key("203.0.113.128/25");
    core.install_route(key, rnh).unwrap();
    assert!(core.route(&key).unwrap().active);

    let fec_calls_before = core.hal().call_count(|c| matches!(c, HalCall::AllocFec(_)));
    assert_eq!(fec_calls_before, 1);

    // The IGP route covering the RNH's address now points at a different target
    // (e.g. the tunnel re-routed), and the LPM reports the change.
    let new_target = core.store_mut().insert(direct_next_hop(mac(0x22), 22)).unwrap();
    core.lpm().set_route(rnh_addr, 32, new_target, igp_route_id);
    core.on_route_change(igp_route_id, Change::Modified).unwrap();

    assert!(core.route(&key).unwrap().active, "route must stay active across re-resolution");

    // The stale FEC (which mirrored `old_target`) must be freed, and a fresh one
    // programmed against `new_target` rather than the cache being returned as-is.
    assert!(core.hal().calls().iter().any(|c| matches!(c, HalCall::FreeFec(_))), "stale FEC must be freed");
    let fec_calls_after = core.hal().call_count(|c| matches!(c, HalCall::AllocFec(_)));
    assert_eq!(fec_calls_after, 2, "re-resolution must allocate a fresh FEC for the new target");

    let last_program = core
        .hal()
        .calls()
        .iter()
        .rev()
        .find_map(|c| if let HalCall::ProgramFecSimple(_, _, port) = c { Some(*port) } else { None })
        .expect("a FEC must have been reprogrammed");
    assert_eq!(last_program, 22, "the reprogrammed FEC must point at the new target's egress port");
}

/// S6 - Withdraw with shared next-hop: refcounts and hardware survive the first
/// withdraw of two routes sharing a `DirectNextHop`, then free on the second.
#[test]
fn s6_withdraw_with_shared_next_hop() {
    let mut core = new_core(FibCoreConfig::default());

    let d = core.store_mut().insert(direct_next_hop(mac(0x9A), 30)).unwrap();
    let r1 = route_key("198.51.100.0/24");
    let r2 = route_key("198.51.101.0/24");
    core.install_route(r1, d).unwrap();
    core.install_route(r2, d).unwrap();
    assert_eq!(core.store().refcount(d).unwrap(), 2);

    core.withdraw_route(r1).unwrap();
    assert_eq!(core.store().refcount(d).unwrap(), 1);
    assert!(core.store().get(d).is_ok(), "D must still be live while R2 references it");
    assert!(core.route(&r2).unwrap().active);
    assert!(!core.hal().calls().iter().any(|c| matches!(c, HalCall::FreeFec(_) | HalCall::FreeEedb(_))));

    core.withdraw_route(r2).unwrap();
    assert!(core.store().get(d).is_err(), "D must be destroyed once both routes withdraw");
    assert!(core.hal().calls().iter().any(|c| matches!(c, HalCall::FreeFec(_))));
    assert!(core.hal().calls().iter().any(|c| matches!(c, HalCall::FreeEedb(_))));
}
