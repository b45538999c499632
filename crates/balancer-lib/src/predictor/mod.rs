//! Trend-based load forecasting

mod capacity;
mod trend;

pub use capacity::{
    forecast_capacity, predict_resource_needs, recommend, CapacityForecast, ResourceFigures,
    ResourcePrediction, ScalingRecommendation, FORECAST_PERIODS, MIN_PREDICTION_SAMPLES,
    PREDICTION_CONFIDENCE, PREDICTION_LOOKBACK,
};
pub use trend::{calculate_trend, forecast_value, variance, FORECAST_MARGIN};
