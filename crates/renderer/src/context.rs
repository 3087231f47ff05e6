use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::device::GraphicsDevice;
use crate::error::RendererError;
use crate::types::ContextId;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a rendering device bound to one surface.
///
/// The id is assigned at construction and never reused. Clones share the same
/// device and identity; they exist so the render loop and cleanup can reach
/// the device the owning component acquired.
pub struct GraphicsContext<D> {
    id: ContextId,
    device: Rc<RefCell<D>>,
}

impl<D: GraphicsDevice> GraphicsContext<D> {
    pub fn new(device: D) -> Self {
        let id = ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(context = %id, "graphics context created");
        Self {
            id,
            device: Rc::new(RefCell::new(device)),
        }
    }
}

impl<D> GraphicsContext<D> {
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Mutable access to the device. Panics if the device is already
    /// borrowed, which only happens on re-entrant use from a frame callback.
    pub fn device(&self) -> RefMut<'_, D> {
        self.device.borrow_mut()
    }

    pub fn device_ref(&self) -> Ref<'_, D> {
        self.device.borrow()
    }

    /// True when both handles refer to the very same device instance.
    pub fn same_context(&self, other: &GraphicsContext<D>) -> bool {
        self.id == other.id && Rc::ptr_eq(&self.device, &other.device)
    }

    pub(crate) fn downgrade(&self) -> ContextRef<D> {
        ContextRef {
            id: self.id,
            device: Rc::downgrade(&self.device),
        }
    }
}

impl<D> Clone for GraphicsContext<D> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            device: Rc::clone(&self.device),
        }
    }
}

impl<D> fmt::Debug for GraphicsContext<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphicsContext").field("id", &self.id).finish()
    }
}

/// Non-owning reference to the context a program was built on.
pub(crate) struct ContextRef<D> {
    id: ContextId,
    device: Weak<RefCell<D>>,
}

impl<D> ContextRef<D> {
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Identity check: same id and the same live device allocation.
    pub fn refers_to(&self, context: &GraphicsContext<D>) -> bool {
        self.id == context.id && std::ptr::eq(self.device.as_ptr(), Rc::as_ptr(&context.device))
    }

    pub fn upgrade(&self) -> Option<Rc<RefCell<D>>> {
        self.device.upgrade()
    }
}

/// Acquires a rendering context bound to a surface.
pub trait ContextProvider<S: ?Sized> {
    type Device: GraphicsDevice;

    fn acquire(&mut self, surface: &S) -> Result<GraphicsContext<Self::Device>, RendererError>;
}
