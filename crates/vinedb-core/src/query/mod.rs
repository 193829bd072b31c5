pub mod chain;
pub mod compiler;
pub mod fragment;
pub mod run;


pub use compiler::{LabelParam, MainSpec, OrderSpec, QueryCompiler, QueryRequest};
pub use fragment::{Comparator, Page, QueryPlan};
pub use run::{QueryResult, QuerySize, run};
