use std::net::Ipv4Addr;

/// API path prefix
pub const API_PREFIX: &str = "/v1";

/// Default DNS suffix appended to every synthesized hostname
pub const DEFAULT_DOMAIN_SUFFIX: &str = "bosh";

/// Base of the link-local block virtual addresses are drawn from.
/// The low byte is replaced by the allocation cursor, starting at 1.
pub const VIP_BASE: Ipv4Addr = Ipv4Addr::new(169, 254, 255, 0);

/// Number of distinct virtual addresses available per process lifetime
pub const VIP_CAPACITY: u8 = 254;

/// Instance label keys
pub const LABEL_VM_STATE: &str = "vm.state";
pub const LABEL_VM_JOB_STATE: &str = "vm.job_state";
pub const LABEL_PROCESS_STATE: &str = "process.state";
pub const LABEL_INDEX: &str = "index";
pub const LABEL_DNS_PREFIX: &str = "dns-";
