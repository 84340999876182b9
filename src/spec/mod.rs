//! Command specifications: the tree model, where trees come from, and the
//! built-in catalogue

pub mod builtin;
mod model;
mod registry;

pub use model::{
    ArgSpec, CustomGeneratorFn, DynamicScriptFn, FilterStrategy, Generator, Hook, Names,
    OptionSpec, PostProcessFn, Script, Subcommand, SuggestionSpec, Template, TemplateFilterFn,
};
pub use registry::{
    load_spec_file, ChainRegistry, DirectoryRegistry, SpecFactoryFn, SpecLoader, SpecModule,
    SpecRegistry, StaticRegistry,
};
