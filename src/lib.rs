//! Loader licensing gateway and payment-driven key provisioning.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod state;

pub mod crypto {
    pub mod ipn_signature;
    pub mod nonce;
    pub mod obfuscation;
    pub mod token;
}

pub mod models {
    pub mod ipn;
    pub mod plan;
    pub mod subscription;
    pub mod user;
}

pub mod repositories {
    pub mod subscription;
    pub mod user;
}

pub mod services {
    pub mod authority;
    pub mod loader;
    pub mod payments;
    pub mod provisioning;
    pub mod reconcile;
}

pub mod handlers {
    pub mod admin;
    pub mod health;
    pub mod loader;
    pub mod payments;
    pub mod support;
}

pub mod middleware_layer {
    pub mod auth;
}

pub mod validation {
    pub mod order;
}
