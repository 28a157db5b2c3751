//! CommonJS module system: module cache, resolver chain, loader and batch
//! reload.

mod cache;
mod loader;
pub mod path;
mod reload;
mod resolver;

use jsbind_core::Value;

pub use cache::{ModuleCache, ModuleIndex, ModuleRecord, ModuleState};
pub use reload::ReloadReport;
pub use resolver::{
    DefineModuleResolver, JsonModuleResolver, ModuleResolver, SourceModuleResolver,
    StaticModuleResolver, default_resolvers,
};

/// Module declared through the global `define(id, deps, factory)`.
pub struct DefinedModule {
    pub deps: Vec<String>,
    /// Owned; a function, or the exports value itself.
    pub factory: Value,
}
