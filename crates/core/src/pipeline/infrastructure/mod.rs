pub mod threaded_training_executor;
