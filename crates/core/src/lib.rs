pub mod config;

pub mod shared {
    pub mod clock;
    pub mod constants;
    pub mod embedding;
    pub mod ids;
    pub mod model_resolver;
    pub mod probe_image;
    pub mod raster;
    pub mod region;
    pub mod sign_error;
}

pub mod detection {
    pub mod domain {
        pub mod face_detector;
        pub mod face_selector;
    }
    pub mod infrastructure;
}

pub mod embedding {
    pub mod domain {
        pub mod embedding_extractor;
        pub mod face_crop;
    }
    pub mod infrastructure;
}

pub mod matching {
    pub mod domain {
        pub mod match_result;
        pub mod matcher;
    }
}

pub mod templates {
    pub mod domain {
        pub mod face_template;
        pub mod template_store;
    }
    pub mod infrastructure;
}

pub mod signing {
    pub mod domain {
        pub mod document_signature;
        pub mod sign_outcome;
        pub mod signature_repository;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod audit_logger;
    pub mod enroll_identity_use_case;
    pub mod face_embedder;
    pub mod keyed_locks;
    pub mod sign_document_use_case;
    pub mod sign_state;
}
