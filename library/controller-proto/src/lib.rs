tonic::include_proto!("sanfran.controller");
