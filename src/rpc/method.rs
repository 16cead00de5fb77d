// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::buffers::{NbInbuf, NbOutbuf};
use crate::fail::Fail;
use crate::logging::LoggingContext;
use crate::wire::{Identifier, Status};

use std::collections::HashMap;

//==============================================================================
// Method
//==============================================================================

/// A server-side method instance: a state machine that reads its own
/// arguments off the connection, does its work, and writes its reply.
pub trait Method: Send {
    fn step(
        &mut self,
        ctx: &LoggingContext,
        inbuf: &mut NbInbuf,
        outbuf: &mut NbOutbuf,
    ) -> Result<Status<()>, Fail>;
}

/// Callable producing a fresh method instance per request.
pub type MethodFactory = Box<dyn Fn() -> Box<dyn Method> + Send + Sync>;

//==============================================================================
// Method Map
//==============================================================================

/// Mapping from method identifier to method factory. Factories are
/// registered once at startup; the map is read-only thereafter.
#[derive(Default)]
pub struct MethodMap {
    factories: HashMap<Identifier, MethodFactory>,
}

/// Associate functions for [MethodMap].
impl MethodMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for the method named `name`.
    ///
    /// Panics on an invalid name or a duplicate registration.
    pub fn add_method<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Method> + Send + Sync + 'static,
    {
        let name = Identifier::new(name).expect("valid method name");
        let previous = self.factories.insert(name, Box::new(factory));
        assert!(previous.is_none(), "duplicate method registration");
    }

    /// Creates a method instance for `name`, or `None` if the name is not
    /// registered.
    pub fn create(&self, name: &Identifier) -> Option<Box<dyn Method>> {
        self.factories.get(name).map(|factory| factory())
    }
}

//==============================================================================
// Unit Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct NullMethod;

    impl Method for NullMethod {
        fn step(
            &mut self,
            _ctx: &LoggingContext,
            _inbuf: &mut NbInbuf,
            _outbuf: &mut NbOutbuf,
        ) -> Result<Status<()>, Fail> {
            Ok(Status::Done(()))
        }
    }

    #[test]
    fn lookup_by_identifier_equality() {
        let mut map = MethodMap::new();
        map.add_method("ping", || Box::new(NullMethod));

        assert!(map.create(&Identifier::new("ping").unwrap()).is_some());
        assert!(map.create(&Identifier::new("pong").unwrap()).is_none());
    }
}
