//! Binding Generator: turns command components into invocable handlers,
//! grouped into one binding module per extension.

pub mod availability;
pub mod error;
pub mod generator;
pub mod handler;
pub mod module;
pub mod registry;

pub use {
    availability::{Availability, HostState},
    error::{Error, Result},
    generator::{BINDINGS_SUFFIX, BindingGenerator, BindingOutcome, ReconcileStats},
    handler::{
        CommandHandler, ExecutionOutcome, HostInvoker, HostRequest, Invocation, NoHostInvoker,
        UrlOpener,
    },
    module::{BindingFailure, BindingModule, HandlerSpec, HandlerTarget, ModuleOrigin},
    registry::ModuleRegistry,
};
