pub(crate) use {
    std::{
        collections::HashMap,
        path::PathBuf,
        time::Duration,
    },
    chrono::prelude::*,
    log::{
        error,
        info,
        warn,
    },
    serde::Deserialize,
    crate::config::Config,
};
