mod partition;
mod pipeline;
