//! # ibmi-core
//!
//! Shared data model for the IBM i / Db2-for-i MCP tool gateway: the
//! declarative tool-catalog configuration types (sources, tools, toolsets),
//! the config loader/merger (C5), and small dependency-free SQL-text
//! scanning helpers shared between config validation and the parameter
//! binder.
//!
//! This crate has no knowledge of MCP, the gateway wire protocol, or
//! authentication — those live in `ibmi-mcp`, `ibmi-gateway`, and
//! `ibmi-auth` respectively, all of which depend on the types here.

pub mod config;
pub mod sql;

pub use config::{Config, ParameterSpec, ParameterType, SourceSpec, ToolSpec, ToolsetSpec};
