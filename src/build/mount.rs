//! Mount points - applications built into a host element, registered with
//! the runtime so they can be listed and rebuilt from the DevTools panel.

use std::fmt;
use std::rc::Rc;

use super::context::BuildContext;
use super::node::{build, NodeFactory};
use crate::devtools::protocol::MountPointInfo;
use crate::dom::Document;
use crate::error::{Result, SutilError};
use crate::runtime::Runtime;
use crate::types::{events, NodeId};

struct MountPointInner {
    id: String,
    mount_id: u64,
    document: Document,
    host: NodeId,
    app: NodeFactory,
}

/// An application mounted into a host element.
#[derive(Clone)]
pub struct MountPoint {
    inner: Rc<MountPointInner>,
}

impl fmt::Debug for MountPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountPoint")
            .field("id", &self.inner.id)
            .field("mount_id", &self.inner.mount_id)
            .field("host", &self.inner.host)
            .finish()
    }
}

impl MountPoint {
    /// Host element id.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Sequence number assigned when the point was registered.
    pub fn mount_id(&self) -> u64 {
        self.inner.mount_id
    }

    pub fn host(&self) -> NodeId {
        self.inner.host
    }

    pub fn document(&self) -> &Document {
        &self.inner.document
    }

    pub fn info(&self) -> MountPointInfo {
        MountPointInfo { id: self.inner.id.clone(), mount_id: self.inner.mount_id }
    }

    /// Clean up and remove everything under the host, including the
    /// bindings the app registered on the host itself.
    pub fn clear(&self) {
        let doc = &self.inner.document;
        doc.drain_disposables(self.inner.host);
        for child in doc.children(self.inner.host) {
            doc.unmount(child);
        }
    }

    /// Build the application into the (cleared) host.
    pub fn rebuild(&self, runtime: &Runtime) -> Result<()> {
        let doc = &self.inner.document;
        if !doc.is_alive(self.inner.host) {
            return Err(SutilError::StaleNode(self.inner.host));
        }
        self.clear();
        build(&self.inner.app, &BuildContext::new(runtime, doc, self.inner.host))?;
        Ok(())
    }
}

/// Build `app` into the element with id `element_id`, replacing its
/// content, and register the mount point.
pub fn mount_element(
    runtime: &Runtime,
    document: &Document,
    element_id: &str,
    app: NodeFactory,
) -> Result<MountPoint> {
    let host = document
        .get_element_by_id(element_id)
        .ok_or_else(|| SutilError::ElementNotFound(element_id.to_string()))?;

    let mount = MountPoint {
        inner: Rc::new(MountPointInner {
            id: element_id.to_string(),
            mount_id: runtime.next_mount_id(),
            document: document.clone(),
            host,
            app,
        }),
    };
    mount.rebuild(runtime)?;
    runtime.add_mount(mount.clone());
    runtime.log("dom", &format!("mounted '{element_id}' ({})", mount.mount_id()));
    document.dispatch_custom(host, events::ELEMENT_READY, None);
    Ok(mount)
}

/// Clean up and rebuild a registered mount point.
pub fn remount(runtime: &Runtime, id: &str) -> Result<()> {
    let mount = runtime
        .find_mount(id)
        .ok_or_else(|| SutilError::MountPointNotFound(id.to_string()))?;
    tracing::debug!(mount = id, "remount");
    mount.rebuild(runtime)
}

/// Clear and unregister a mount point.
pub fn unmount_point(runtime: &Runtime, id: &str) -> Result<()> {
    let mount = runtime
        .remove_mount(id)
        .ok_or_else(|| SutilError::MountPointNotFound(id.to_string()))?;
    mount.clear();
    Ok(())
}

/// Registered mount points in registration order.
pub fn mount_points(runtime: &Runtime) -> Vec<MountPointInfo> {
    runtime.mounts().iter().map(MountPoint::info).collect()
}
