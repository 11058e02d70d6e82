pub mod config;
pub mod consts;
pub mod error;
pub mod events;
pub mod field;
pub mod function;
pub mod image;
pub mod io;
pub mod multires;
pub mod pipeline;
pub mod pyramid;
pub mod solver;
