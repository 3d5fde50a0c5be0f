//! Custom Resource Definitions for the Notebook controller

mod notebook;
mod types;

pub use notebook::{Notebook, NotebookSpec, NotebookStatus};
pub use types::{
    NotebookCondition, NotebookConditionType, NotebookTemplateSpec, VolumeClaim,
};
