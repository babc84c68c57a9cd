//! 数据模型模块
//! 用户、会话、登录记录与审计快照

pub mod audit;
pub mod auth;
pub mod login_attempt;
pub mod response;
pub mod session;
pub mod user;
