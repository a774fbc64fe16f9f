// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Service and process registration under `/system`

use std::sync::Arc;

use tracing::{debug, info};

use crate::content::ContentProvider;
use crate::error::{FsError, FsResult};
use crate::fault::FaultOp;
use crate::files::FileTable;
use crate::pool::{node_ref, Node, NodeIndex, NodeKind, NodePool};
use crate::types::{NodeRef, Pid, MAX_NAME_LEN};
use crate::vfs::{live, Namespace, PROCESSES, SERVICES};

fn valid_service_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_NAME_LEN && name.bytes().all(|b| b.is_ascii_alphanumeric())
}

impl Namespace {
    /// Register `name` under `/system/services` on behalf of `owner`
    pub fn register_service(&self, owner: Pid, name: &str) -> FsResult<NodeRef> {
        if !valid_service_name(name) {
            debug!(%owner, name, "invalid service name");
            return Err(FsError::InvalidServiceName);
        }

        let mut tree = self.tree();
        for (_, service) in tree.children(SERVICES) {
            if service.name == name {
                debug!(%owner, name, "service name taken");
                return Err(FsError::ServiceNameExists);
            }
            if let NodeKind::Service { owner: existing } = service.kind {
                if existing == owner {
                    debug!(%owner, name, "owner already has a service");
                    return Err(FsError::ProcessAlreadyHasService);
                }
            }
        }

        let index = self.create_child(&mut tree, SERVICES, name, NodeKind::Service { owner })?;
        info!(%owner, name, node = %node_ref(index), "service registered");
        Ok(node_ref(index))
    }

    /// Remove the service owned by `owner` along with its pending queue
    pub fn unregister_service(&self, owner: Pid) -> bool {
        let mut files = self.files();
        let mut tree = self.tree();
        let Some(index) = find_service(&tree, owner) else {
            return false;
        };
        let name = destroy_subtree(&mut files, &mut tree, index);
        info!(%owner, %name, "service unregistered");
        true
    }

    /// Node of the service registered by `owner`
    pub fn service_for(&self, owner: Pid) -> Option<NodeRef> {
        find_service(&self.tree(), owner).map(node_ref)
    }

    /// Publish `pid` as an info node under `/system/processes`
    pub fn publish_process(
        &self,
        pid: Pid,
        provider: Arc<dyn ContentProvider>,
    ) -> FsResult<NodeRef> {
        let name = pid.to_string();
        let mut tree = self.tree();
        if tree.find_child(PROCESSES, &name).is_some() {
            debug!(%pid, "process already published");
            return Err(FsError::ProcessAlreadyPublished);
        }
        let index = self.create_child(&mut tree, PROCESSES, &name, NodeKind::Info(provider))?;
        info!(%pid, node = %node_ref(index), "process published");
        Ok(node_ref(index))
    }

    pub fn unpublish_process(&self, pid: Pid) -> bool {
        let mut files = self.files();
        let mut tree = self.tree();
        let Some(index) = tree.find_child(PROCESSES, &pid.to_string()) else {
            return false;
        };
        destroy_subtree(&mut files, &mut tree, index);
        info!(%pid, "process unpublished");
        true
    }

    /// Queue `client` on `service`. A client already waiting keeps its entry.
    pub fn enqueue_for_service(&self, client: Pid, service: NodeRef) -> FsResult<NodeRef> {
        let name = client.to_string();
        let mut tree = self.tree();
        let index = service_index(&tree, service)?;
        if let Some(existing) = tree.find_child(index, &name) {
            return Ok(node_ref(existing));
        }
        let entry = self.create_child(&mut tree, index, &name, NodeKind::ServiceQueue { client })?;
        debug!(%client, %service, "client queued");
        Ok(node_ref(entry))
    }

    pub fn dequeue_for_service(&self, client: Pid, service: NodeRef) -> FsResult<bool> {
        let mut files = self.files();
        let mut tree = self.tree();
        let index = service_index(&tree, service)?;
        let Some(entry) = tree.find_child(index, &client.to_string()) else {
            return Ok(false);
        };
        destroy_subtree(&mut files, &mut tree, entry);
        debug!(%client, %service, "client dequeued");
        Ok(true)
    }

    /// Clients waiting on `service`, oldest first
    pub fn pending_clients(&self, service: NodeRef) -> FsResult<Vec<Pid>> {
        let tree = self.tree();
        let index = service_index(&tree, service)?;
        Ok(tree
            .children(index)
            .filter_map(|(_, entry)| match entry.kind {
                NodeKind::ServiceQueue { client } => Some(client),
                _ => None,
            })
            .collect())
    }

    /// Allocate a node, give it its own copy of `name` and link it under
    /// `parent`. Nothing becomes reachable unless every step succeeds.
    fn create_child(
        &self,
        tree: &mut NodePool,
        parent: NodeIndex,
        name: &str,
        kind: NodeKind,
    ) -> FsResult<NodeIndex> {
        self.faults.check(FaultOp::AllocateNode)?;
        let index = tree
            .allocate(Node::new(String::new(), kind))
            .map_err(|_| FsError::ResourceExhausted)?;

        match self.own_name(name) {
            Ok(owned) => tree.node_mut(index).name = owned,
            Err(err) => {
                tree.release(index);
                debug!(name, %err, "node creation rolled back");
                return Err(err);
            }
        }
        tree.append_child(parent, index);
        Ok(index)
    }

    fn own_name(&self, name: &str) -> FsResult<String> {
        if name.len() > MAX_NAME_LEN {
            return Err(FsError::InvalidArgument);
        }
        self.faults.check(FaultOp::AllocateName)?;
        let mut owned = String::new();
        owned.try_reserve_exact(name.len()).map_err(|_| FsError::OutOfMemory)?;
        owned.push_str(name);
        Ok(owned)
    }
}

fn find_service(tree: &NodePool, owner: Pid) -> Option<NodeIndex> {
    tree.children(SERVICES)
        .find(|(_, node)| matches!(node.kind, NodeKind::Service { owner: o } if o == owner))
        .map(|(index, _)| index)
}

/// Pool index of a live service node
fn service_index(tree: &NodePool, service: NodeRef) -> FsResult<NodeIndex> {
    match live(tree, service)?.kind {
        NodeKind::Service { .. } => Ok(service.index()),
        _ => Err(FsError::InvalidArgument),
    }
}

/// Detach `index` from its parent and release it with everything below it.
/// Files still open on a released node are cut loose so they cannot reach
/// whatever reuses the slot. Returns the node's name.
fn destroy_subtree(files: &mut FileTable, tree: &mut NodePool, index: NodeIndex) -> String {
    while let Some(child) = tree.node(index).first_child() {
        destroy_subtree(files, tree, child);
    }
    if let Some(parent) = tree.node(index).parent() {
        tree.remove_child(parent, index);
    }
    let open = files.detach(node_ref(index));
    if open > 0 {
        debug!(node = %node_ref(index), open, "open files detached from removed node");
    }
    tree.release(index).name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::{FaultErrno, FaultPolicy, FaultRule};
    use crate::types::DIR_RECORD_SIZE;
    use crate::{Unsupported, VfsConfig, VfsLimits};

    fn provider(text: &'static str) -> Arc<dyn ContentProvider> {
        Arc::new(move |_node: NodeRef| -> FsResult<Vec<u8>> { Ok(text.as_bytes().to_vec()) })
    }

    fn listing_len(ns: &Namespace, node: NodeRef) -> usize {
        let mut buf = vec![0u8; 64 * DIR_RECORD_SIZE];
        ns.provide(node, 0, &mut buf).expect("provide")
    }

    #[test]
    fn test_register_and_resolve_service() {
        let ns = Namespace::default();
        let node = ns.register_service(Pid(10), "console").expect("register");
        assert_eq!(ns.resolve("/system/services/console"), Ok(node));
        assert_eq!(ns.service_for(Pid(10)), Some(node));
        assert_eq!(ns.service_for(Pid(11)), None);
    }

    #[test]
    fn test_service_name_rules() {
        let ns = Namespace::default();
        for bad in ["", "con sole", "a/b", "net-0", "caf\u{e9}"] {
            assert_eq!(ns.register_service(Pid(1), bad), Err(FsError::InvalidServiceName), "{bad:?}");
        }
        let too_long = "a".repeat(MAX_NAME_LEN + 1);
        assert_eq!(ns.register_service(Pid(1), &too_long), Err(FsError::InvalidServiceName));
        assert!(ns.register_service(Pid(1), &"a".repeat(MAX_NAME_LEN)).is_ok());
    }

    #[test]
    fn test_duplicate_service() {
        let ns = Namespace::default();
        ns.register_service(Pid(1), "disk").expect("register");
        assert_eq!(ns.register_service(Pid(2), "disk"), Err(FsError::ServiceNameExists));
        assert_eq!(
            ns.register_service(Pid(1), "disk2"),
            Err(FsError::ProcessAlreadyHasService)
        );
    }

    #[test]
    fn test_unregister_frees_node_for_reuse() {
        let ns = Namespace::default();
        ns.register_service(Pid(1), "disk").expect("register");
        let used = ns.tree().used();

        assert!(ns.unregister_service(Pid(1)));
        assert!(!ns.unregister_service(Pid(1)));
        assert_eq!(ns.tree().used(), used - 1);
        assert_eq!(ns.resolve("/system/services/disk"), Err(FsError::NodeNotFound));

        assert!(ns.register_service(Pid(2), "disk").is_ok());
        assert!(ns.tree().verify(crate::vfs::ROOT).is_ok());
    }

    #[test]
    fn test_publish_twice_keeps_first() {
        let ns = Namespace::default();
        let first = ns.publish_process(Pid(7), provider("first")).expect("publish");
        assert_eq!(
            ns.publish_process(Pid(7), provider("second")),
            Err(FsError::ProcessAlreadyPublished)
        );
        assert_eq!(ns.resolve("/system/processes/7"), Ok(first));

        let mut buf = [0u8; 16];
        let n = ns.provide(first, 0, &mut buf).expect("provide");
        assert_eq!(&buf[..n], b"first");
    }

    #[test]
    fn test_publish_invalidates_listing() {
        let ns = Namespace::default();
        assert_eq!(listing_len(&ns, ns.processes()), 0);
        ns.publish_process(Pid(1), provider("init")).expect("publish");
        assert_eq!(listing_len(&ns, ns.processes()), DIR_RECORD_SIZE);
        assert!(ns.unpublish_process(Pid(1)));
        assert_eq!(listing_len(&ns, ns.processes()), 0);
        assert!(!ns.unpublish_process(Pid(1)));
    }

    #[test]
    fn test_pool_exhaustion_is_recoverable() {
        let config = VfsConfig {
            limits: VfsLimits {
                node_capacity: 6,
                file_capacity: 4,
            },
            ..Default::default()
        };
        let ns = Namespace::new(config).expect("namespace");
        ns.publish_process(Pid(1), provider("a")).expect("last free node");
        assert_eq!(
            ns.publish_process(Pid(2), provider("b")),
            Err(FsError::ResourceExhausted)
        );
        assert!(ns.unpublish_process(Pid(1)));
        assert!(ns.publish_process(Pid(2), provider("b")).is_ok());
    }

    #[test]
    fn test_name_fault_rolls_back_node() {
        let ns = Namespace::default();
        let used = ns.tree().used();
        ns.fault_injector().set_policy(FaultPolicy::with_rule(FaultRule::once(
            FaultOp::AllocateName,
            FaultErrno::Enomem,
        )));
        assert_eq!(ns.register_service(Pid(3), "net"), Err(FsError::OutOfMemory));
        assert_eq!(ns.tree().used(), used);
        assert!(ns.tree().verify(crate::vfs::ROOT).is_ok());
        assert!(ns.register_service(Pid(3), "net").is_ok());
    }

    #[test]
    fn test_service_queue() {
        let ns = Namespace::default();
        let service = ns.register_service(Pid(5), "input").expect("register");

        let a = ns.enqueue_for_service(Pid(20), service).expect("enqueue");
        let b = ns.enqueue_for_service(Pid(21), service).expect("enqueue");
        assert_ne!(a, b);
        assert_eq!(ns.enqueue_for_service(Pid(20), service), Ok(a));
        assert_eq!(ns.pending_clients(service), Ok(vec![Pid(20), Pid(21)]));

        assert_eq!(ns.dequeue_for_service(Pid(20), service), Ok(true));
        assert_eq!(ns.dequeue_for_service(Pid(20), service), Ok(false));
        assert_eq!(ns.pending_clients(service), Ok(vec![Pid(21)]));
    }

    #[test]
    fn test_queue_needs_a_service() {
        let ns = Namespace::default();
        assert_eq!(
            ns.enqueue_for_service(Pid(1), ns.system()),
            Err(FsError::InvalidArgument)
        );
        assert_eq!(
            ns.pending_clients(NodeRef::virtual_node(300)),
            Err(FsError::NodeNotFound)
        );
    }

    #[test]
    fn test_unregister_drops_queue() {
        let ns = Namespace::default();
        let used = ns.tree().used();
        let service = ns.register_service(Pid(5), "input").expect("register");
        ns.enqueue_for_service(Pid(20), service).expect("enqueue");
        ns.enqueue_for_service(Pid(21), service).expect("enqueue");

        assert!(ns.unregister_service(Pid(5)));
        assert_eq!(ns.tree().used(), used);
        assert!(ns.tree().verify(crate::vfs::ROOT).is_ok());
    }

    #[test]
    fn test_path_into_service_is_forwarded() {
        let ns = Namespace::default();
        let service = ns.register_service(Pid(9), "audio").expect("register");
        assert_eq!(
            ns.lookup("/system/services/audio/mixer/0"),
            Ok(crate::Resolution::Service {
                service,
                owner: Pid(9),
                remainder: "mixer/0".to_string(),
            })
        );
        assert_eq!(
            ns.resolve("/system/services/audio/mixer"),
            Err(FsError::UnsupportedOperation(Unsupported::ServiceIndirection))
        );
    }
}
