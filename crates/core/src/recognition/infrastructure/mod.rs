pub mod eigenface_engine;
