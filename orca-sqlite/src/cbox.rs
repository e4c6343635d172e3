use std::ops::{Deref, DerefMut};

/// Owner of a pointer allocated by sqlite, released with `dealloc` unless null.
#[derive(Debug)]
pub(crate) struct CBox<T> {
    pub(crate) ptr: *mut T,
    dealloc: fn(*mut T),
}

impl<T> CBox<T> {
    pub fn new(ptr: *mut T, dealloc: fn(*mut T)) -> Self {
        Self { ptr, dealloc }
    }
}

impl<T> Drop for CBox<T> {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            (self.dealloc)(self.ptr);
        }
    }
}

impl<T> Deref for CBox<T> {
    type Target = *mut T;

    fn deref(&self) -> &Self::Target {
        &self.ptr
    }
}

impl<T> DerefMut for CBox<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.ptr
    }
}

unsafe impl<T> Send for CBox<T> {}
unsafe impl<T> Sync for CBox<T> {}

#[cfg(test)]
mod tests {
    use super::CBox;
    use std::{
        ptr,
        sync::atomic::{AtomicBool, Ordering},
    };

    #[test]
    fn releases_only_non_null() {
        static DESTROYED: AtomicBool = AtomicBool::new(false);
        {
            let value = CBox::new(ptr::null_mut::<i32>(), |_| {
                DESTROYED.store(true, Ordering::Relaxed)
            });
            assert!(value.is_null());
        }
        assert!(!DESTROYED.load(Ordering::Relaxed));
        let mut v = 123;
        {
            let value = CBox::new(&mut v as *mut i32, |_| {
                DESTROYED.store(true, Ordering::Relaxed)
            });
            assert_eq!(unsafe { **value }, 123);
        }
        assert!(DESTROYED.load(Ordering::Relaxed));
    }
}
