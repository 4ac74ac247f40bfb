tonic::include_proto!("sanfran.fnapi");
