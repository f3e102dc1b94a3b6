mod execution;
mod fixtures;
