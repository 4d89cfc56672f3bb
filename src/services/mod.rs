pub mod action;
pub mod feed;
pub mod geo;
pub mod hub;
pub mod location;
pub mod notice;
pub mod notifier;
pub mod poller;
pub mod ranking;
pub mod selector;
pub mod settings;
