pub mod metrics;
pub mod sampler;

pub use metrics::{ClusterMetrics, MetricsBundle, MetricsSource, NormalizedMetrics};
pub use sampler::{spawn_sampler_loop, SamplerLoop, TelemetrySampler, TickMetrics};
