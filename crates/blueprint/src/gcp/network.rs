use serde_json::json;
use tracing::{Level, instrument};

use crate::{
    Result, WrapErr,
    api::GkeClusterSpec,
    locals::Locals,
    outputs,
    stack::{ResourceOptions, ResourceRef, Stack},
    vars,
};

use super::project::AddedProjects;

pub struct AddedNetwork {
    pub vpc: ResourceRef,
    pub sub_network: ResourceRef,
}

/// VPC, subnetwork with the pod and service secondary ranges, the firewall rule that lets
/// the control plane reach admission webhooks on the nodes, and a router with a static NAT
/// address for egress from the private nodes.
#[instrument(level = Level::DEBUG, skip_all)]
pub fn resources(
    stack: &mut Stack,
    locals: &Locals,
    spec: &GkeClusterSpec,
    provider: &ResourceRef,
    projects: &AddedProjects,
) -> Result<AddedNetwork> {
    let project_id = projects.network.output("projectId");
    let name = &locals.cluster_name;

    let vpc = stack
        .declare(
            "vpc",
            "gcp:compute:Network",
            json!({
                "name": name,
                "project": project_id,
                "autoCreateSubnetworks": false,
            }),
            ResourceOptions::new()
                .parent(&projects.network)
                .provider(provider)
                .depends_on(&projects.services),
        )
        .wrap_err("failed to add vpc network")?;
    stack.export(outputs::NETWORK_SELF_LINK, vpc.output("selfLink"))?;

    let ranges = &locals.ranges;
    let sub_network = stack
        .declare(
            "sub-network",
            "gcp:compute:Subnetwork",
            json!({
                "name": name,
                "project": project_id,
                "network": vpc.id(),
                "region": spec.region,
                "ipCidrRange": ranges.nodes.to_string(),
                "privateIpGoogleAccess": true,
                "secondaryIpRanges": [
                    {
                        "rangeName": locals.pod_secondary_range_name,
                        "ipCidrRange": ranges.pods.to_string(),
                    },
                    {
                        "rangeName": locals.service_secondary_range_name,
                        "ipCidrRange": ranges.services.to_string(),
                    },
                ],
            }),
            ResourceOptions::new().parent(&vpc).provider(provider),
        )
        .wrap_err("failed to add subnetwork")?;
    stack.export(outputs::SUB_NETWORK_SELF_LINK, sub_network.output("selfLink"))?;

    let firewall = stack
        .declare(
            "firewall",
            "gcp:compute:Firewall",
            json!({
                "name": format!("{name}-gke-webhook"),
                "project": project_id,
                "network": vpc.output("name"),
                "sourceRanges": [vars::API_SERVER_IP_CIDR],
                "allows": [{
                    "protocol": "tcp",
                    "ports": [vars::API_SERVER_WEBHOOK_PORT, vars::ISTIO_PILOT_WEBHOOK_PORT],
                }],
                "targetTags": [locals.network_tag],
            }),
            ResourceOptions::new().parent(&vpc).provider(provider),
        )
        .wrap_err("failed to add webhook firewall")?;
    stack.export(
        outputs::GKE_WEBHOOKS_FIREWALL_SELF_LINK,
        firewall.output("selfLink"),
    )?;

    let router = stack
        .declare(
            "router",
            "gcp:compute:Router",
            json!({
                "name": name,
                "project": project_id,
                "network": vpc.output("selfLink"),
                "region": spec.region,
            }),
            ResourceOptions::new().parent(&vpc).provider(provider),
        )
        .wrap_err("failed to add router")?;
    stack.export(outputs::ROUTER_SELF_LINK, router.output("selfLink"))?;

    let nat_ip = stack
        .declare(
            "router-nat-ip",
            "gcp:compute:Address",
            json!({
                "name": format!("{name}-router-nat"),
                "project": project_id,
                "region": router.output("region"),
                "addressType": "EXTERNAL",
                "labels": locals.cloud_labels,
            }),
            ResourceOptions::new().parent(&router).provider(provider),
        )
        .wrap_err("failed to add router nat address")?;
    stack.export(outputs::NAT_IP_ADDRESS, nat_ip.output("address"))?;

    let nat = stack
        .declare(
            "nat-router",
            "gcp:compute:RouterNat",
            json!({
                "name": name,
                "project": project_id,
                "router": router.output("name"),
                "region": router.output("region"),
                "natIpAllocateOption": "MANUAL_ONLY",
                "natIps": [nat_ip.output("selfLink")],
                "sourceSubnetworkIpRangesToNat": "ALL_SUBNETWORKS_ALL_IP_RANGES",
            }),
            ResourceOptions::new().parent(&router).provider(provider),
        )
        .wrap_err("failed to add router nat")?;
    stack.export(outputs::ROUTER_NAT_NAME, nat.output("name"))?;

    Ok(AddedNetwork { vpc, sub_network })
}

#[cfg(test)]
mod tests {
    use crate::{
        api::StackInput, api::tests::GKE_INPUT, cidr::Ipv4Cidr, locals::Locals, vars,
    };

    #[test]
    fn subnetwork_ranges_are_carved_from_cluster_block() {
        let stack = crate::plan(&StackInput::from_yaml(GKE_INPUT).unwrap()).unwrap();
        let sub_network = &stack.resource("sub-network").unwrap().properties;

        let block: Ipv4Cidr = vars::CLUSTER_CIDR_BLOCK.parse().unwrap();
        let mut ranges: Vec<Ipv4Cidr> = vec![
            sub_network["ipCidrRange"].as_str().unwrap().parse().unwrap(),
        ];
        for secondary in sub_network["secondaryIpRanges"].as_array().unwrap() {
            ranges.push(secondary["ipCidrRange"].as_str().unwrap().parse().unwrap());
        }

        assert_eq!(ranges.len(), 3);
        for (i, a) in ranges.iter().enumerate() {
            assert!(block.contains(a));
            for b in &ranges[i + 1..] {
                assert!(!a.overlaps(b), "{a} overlaps {b}");
            }
        }
        assert_eq!(sub_network["secondaryIpRanges"][0]["rangeName"], "demo-pods");
    }

    #[test]
    fn webhook_firewall_targets_node_tag() {
        let input = StackInput::from_yaml(GKE_INPUT).unwrap();
        let StackInput::Gcp(gke) = &input else {
            unreachable!()
        };
        let locals = Locals::for_gke(&gke.target).unwrap();
        let stack = crate::plan(&input).unwrap();

        let firewall = &stack.resource("firewall").unwrap().properties;
        assert_eq!(firewall["targetTags"][0], locals.network_tag.as_str());
        assert_eq!(firewall["sourceRanges"][0], vars::API_SERVER_IP_CIDR);
        assert_eq!(firewall["allows"][0]["ports"][1], vars::ISTIO_PILOT_WEBHOOK_PORT);
    }
}
