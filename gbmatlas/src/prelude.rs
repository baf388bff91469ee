pub use crate::{
    data::{priceseries::*, provider::*, sink::*},
    models::{
        averaging::*, cancellation::*, forecaster::*, gbm::*, pipeline::*, volatility::*,
    },
    utils::errors::*,
};
