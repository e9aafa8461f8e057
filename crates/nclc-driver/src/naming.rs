use nclc_domain::NodeClaimName;

/// VM-backend instance names are the NodeClaim name with this prefix (§6
/// "Name prefixes convey backend").
pub const VM_NAME_PREFIX: &str = "aks-";
/// Machine-backend instance names use a distinct prefix so the router can
/// tell backends apart from the providerID's trailing name segment alone.
pub const MACHINE_NAME_PREFIX: &str = "aksmachine-";

pub fn vm_instance_name(claim_name: &NodeClaimName) -> String {
    format!("{VM_NAME_PREFIX}{}", claim_name.as_str())
}

pub fn machine_instance_name(claim_name: &NodeClaimName) -> String {
    format!("{MACHINE_NAME_PREFIX}{}", claim_name.as_str())
}

pub fn is_machine_backend_name(instance_name: &str) -> bool {
    instance_name.starts_with(MACHINE_NAME_PREFIX)
}

/// Strip the backend-encoded prefix from an instance name, yielding the
/// upstream NodeClaim name. Prefix-strip semantics only — the source
/// ambiguity between `TrimLeft`/`TrimPrefix` resolves to `strip_prefix` (§9).
pub fn claim_name_from_instance_name(instance_name: &str) -> &str {
    instance_name
        .strip_prefix(MACHINE_NAME_PREFIX)
        .or_else(|| instance_name.strip_prefix(VM_NAME_PREFIX))
        .unwrap_or(instance_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_known_prefixes_only() {
        assert_eq!(claim_name_from_instance_name("aks-worker-1"), "worker-1");
        assert_eq!(claim_name_from_instance_name("aksmachine-worker-2"), "worker-2");
        assert_eq!(claim_name_from_instance_name("worker-3"), "worker-3");
    }

    #[test]
    fn machine_prefix_detection() {
        assert!(is_machine_backend_name("aksmachine-worker-1"));
        assert!(!is_machine_backend_name("aks-worker-1"));
    }

    #[test]
    fn trim_prefix_semantics_not_trim_left() {
        // A TrimLeft("aks-", ...) would also eat the leading 'a' repeated
        // below; strip_prefix correctly leaves it alone since "aks-aks-x"
        // only has one leading literal match of the prefix.
        assert_eq!(claim_name_from_instance_name("aks-aks-x"), "aks-x");
    }
}
