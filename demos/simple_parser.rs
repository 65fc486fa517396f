//! Parsing raw requests and inspecting how their bodies are negotiated.

use cms_dispatch::dispatch::negotiate_body;
use cms_dispatch::parse_request;

fn main() {
    let requests: [&[u8]; 4] = [
        b"GET /content-types/3/content?page=2&q=hello%20world HTTP/1.1\r\nHost: cms.local\r\nUser-Agent: ExampleBrowser/1.0\r\n\r\n",
        b"POST /content-types/3/content HTTP/1.1\r\nHost: cms.local\r\nContent-Type: application/json\r\nContent-Length: 17\r\n\r\n{\"title\":\"Hello\"}",
        b"PUT /settings/theme HTTP/1.1\r\nHost: cms.local\r\nContent-Length: 10\r\n\r\nvalue=dark",
        b"FETCH /index.html HTTP/1.1\r\nHost: cms.local\r\n\r\n",
    ];

    for raw in requests {
        match parse_request(raw) {
            Ok(request) => {
                println!("{} {} {}", request.method, request.path, request.version);
                for (name, value) in &request.headers {
                    println!("  {}: {}", name, value);
                }
                for (name, value) in &request.query_params {
                    println!("  ?{} = {}", name, value);
                }
                match serde_json::to_string(&negotiate_body(&request)) {
                    Ok(body) => println!("  body: {}", body),
                    Err(err) => println!("  body not serializable: {}", err),
                }
            }
            Err(err) => {
                println!("Error parsing request: {}", err);
            }
        }
        println!();
    }
}
