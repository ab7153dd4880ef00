//! Face enrollment, training and identification core.
//!
//! Each area splits into `domain` (traits and pure logic) and
//! `infrastructure` (adapters backed by ffmpeg, ONNX Runtime or the
//! filesystem). The binary wires adapters into a [`FaceIdController`].
//!
//! [`FaceIdController`]: pipeline::face_id_controller::FaceIdController

pub mod shared {
    pub mod config;
    pub mod constants;
    pub mod error;
    pub mod face_image;
    pub mod frame;
    pub mod label;
    pub mod region;
}

pub mod capture {
    pub mod domain {
        pub mod frame_source;
    }
    pub mod infrastructure;
}

pub mod detection {
    pub mod domain {
        pub mod face_locator;
    }
    pub mod infrastructure;
}

pub mod enrollment {
    pub mod capture_session;
    pub mod face_normalizer;
}

pub mod dataset {
    pub mod dataset_builder;
    pub mod domain {
        pub mod entry_name;
        pub mod face_image_store;
    }
    pub mod infrastructure;
}

pub mod recognition {
    pub mod domain {
        pub mod recognition_engine;
    }
    pub mod infrastructure;
    pub mod model_store;
}

pub mod pipeline {
    pub mod enrollment_driver;
    pub mod face_id_controller;
    pub mod identify_face_use_case;
    pub mod infrastructure;
    pub mod training_executor;
}
