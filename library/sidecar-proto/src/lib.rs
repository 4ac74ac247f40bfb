tonic::include_proto!("sanfran.sidecar");
