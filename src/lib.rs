//! 多金融平台认证服务库
//! 提供注册、登录、锁定、限流与令牌签发

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;
pub mod telemetry;
