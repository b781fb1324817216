//! The shared movie dataset.
//!
//! Fifty films with structured metadata used by every scenario, plus a small
//! set of filming locations for the geo scenario.

use serde_json::json;
use vecbench_core::{Metadata, VectorItem};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Movie {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub genre: &'static str,
    pub year: u16,
    pub rating: f64,
    pub director: &'static str,
    pub language: &'static str,
}

impl Movie {
    /// Text that gets embedded for this movie.
    pub fn embedding_text(&self) -> String {
        format!("{}. {}", self.title, self.description)
    }

    pub fn metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("title".into(), json!(self.title));
        metadata.insert("description".into(), json!(self.description));
        metadata.insert("genre".into(), json!(self.genre));
        metadata.insert("year".into(), json!(self.year));
        metadata.insert("rating".into(), json!(self.rating));
        metadata.insert("director".into(), json!(self.director));
        metadata.insert("language".into(), json!(self.language));
        metadata
    }

    pub fn to_item(&self, vector: Vec<f32>) -> VectorItem {
        VectorItem::new(self.id, vector, self.metadata())
    }
}

macro_rules! movie {
    ($id:literal, $title:literal, $year:literal, $genre:literal, $rating:literal, $director:literal, $language:literal, $description:literal) => {
        Movie {
            id: $id,
            title: $title,
            description: $description,
            genre: $genre,
            year: $year,
            rating: $rating,
            director: $director,
            language: $language,
        }
    };
}

pub const MOVIES: [Movie; 50] = [
    movie!("mov_01", "Inception", 2010, "Sci-Fi", 8.8, "Christopher Nolan", "English",
        "A thief who steals corporate secrets through dream-sharing technology is given the task of planting an idea into the mind of a CEO."),
    movie!("mov_02", "Interstellar", 2014, "Sci-Fi", 8.7, "Christopher Nolan", "English",
        "A team of explorers travel through a wormhole in space in an attempt to ensure humanity's survival."),
    movie!("mov_03", "The Matrix", 1999, "Sci-Fi", 8.7, "Lana Wachowski", "English",
        "A computer hacker learns the true nature of his reality and his role in the war against its machine controllers."),
    movie!("mov_04", "The Godfather", 1972, "Crime", 9.2, "Francis Ford Coppola", "English",
        "The aging patriarch of an organized crime dynasty transfers control of his clandestine empire to his reluctant son."),
    movie!("mov_05", "The Shawshank Redemption", 1994, "Drama", 9.3, "Frank Darabont", "English",
        "Two imprisoned men bond over a number of years, finding solace and eventual redemption through acts of common decency."),
    movie!("mov_06", "Pulp Fiction", 1994, "Crime", 8.9, "Quentin Tarantino", "English",
        "The lives of two mob hitmen, a boxer and a pair of diner bandits intertwine in four tales of violence and redemption."),
    movie!("mov_07", "The Dark Knight", 2008, "Action", 9.0, "Christopher Nolan", "English",
        "Batman faces the Joker, a criminal mastermind who plunges Gotham City into anarchy."),
    movie!("mov_08", "Forrest Gump", 1994, "Drama", 8.8, "Robert Zemeckis", "English",
        "A kind-hearted man with a low IQ witnesses decades of historic events while the love of his life eludes him."),
    movie!("mov_09", "Parasite", 2019, "Thriller", 8.5, "Bong Joon-ho", "Korean",
        "Greed and class discrimination threaten the symbiotic relationship between a wealthy family and a destitute clan."),
    movie!("mov_10", "Spirited Away", 2001, "Animation", 8.6, "Hayao Miyazaki", "Japanese",
        "A girl wanders into a world ruled by gods, witches and spirits, where humans are changed into beasts."),
    movie!("mov_11", "Amélie", 2001, "Romance", 8.3, "Jean-Pierre Jeunet", "French",
        "A shy waitress in Paris decides to change the lives of those around her while struggling with her own isolation and love."),
    movie!("mov_12", "WALL-E", 2008, "Animation", 8.4, "Andrew Stanton", "English",
        "A lonely robot left to clean up an abandoned Earth falls in love and follows her into space."),
    movie!("mov_13", "Saving Private Ryan", 1998, "War", 8.6, "Steven Spielberg", "English",
        "Following the Normandy landings, a group of soldiers go behind enemy lines in the war to retrieve a paratrooper."),
    movie!("mov_14", "Blade Runner 2049", 2017, "Sci-Fi", 8.0, "Denis Villeneuve", "English",
        "A blade runner hunting rogue replicants uncovers a long-buried secret that could plunge society into chaos."),
    movie!("mov_15", "Ex Machina", 2014, "Sci-Fi", 7.7, "Alex Garland", "English",
        "A programmer evaluates the human qualities of a humanoid robot built by a reclusive tech genius."),
    movie!("mov_16", "Arrival", 2016, "Sci-Fi", 7.9, "Denis Villeneuve", "English",
        "A linguist works with the military to communicate with alien lifeforms after mysterious spacecraft appear around the world."),
    movie!("mov_17", "Titanic", 1997, "Romance", 7.9, "James Cameron", "English",
        "A seventeen-year-old aristocrat falls in love with a kind but poor artist aboard the ill-fated ship."),
    movie!("mov_18", "La La Land", 2016, "Romance", 8.0, "Damien Chazelle", "English",
        "A jazz pianist and an aspiring actress fall in love while pursuing their dreams in Los Angeles."),
    movie!("mov_19", "Goodfellas", 1990, "Crime", 8.7, "Martin Scorsese", "English",
        "The story of Henry Hill and his life in the mob, covering his relationship with his wife and his partners in crime."),
    movie!("mov_20", "City of God", 2002, "Crime", 8.6, "Fernando Meirelles", "Portuguese",
        "In the slums of Rio, two kids' paths diverge as one struggles to become a photographer and the other a drug dealer."),
    movie!("mov_21", "Pan's Labyrinth", 2006, "Fantasy", 8.2, "Guillermo del Toro", "Spanish",
        "In the Spain of 1944, a girl escapes the aftermath of the civil war into an eerie but captivating fantasy world."),
    movie!("mov_22", "The Lord of the Rings: The Fellowship of the Ring", 2001, "Fantasy", 8.9, "Peter Jackson", "English",
        "A meek hobbit and eight companions set out on a journey to destroy the powerful One Ring."),
    movie!("mov_23", "Gladiator", 2000, "Action", 8.5, "Ridley Scott", "English",
        "A former Roman general sets out to exact vengeance against the corrupt emperor who murdered his family."),
    movie!("mov_24", "Alien", 1979, "Horror", 8.5, "Ridley Scott", "English",
        "The crew of a commercial spacecraft encounter a deadly lifeform after investigating an unknown transmission."),
    movie!("mov_25", "The Shining", 1980, "Horror", 8.4, "Stanley Kubrick", "English",
        "A family heads to an isolated hotel for the winter where a sinister presence drives the father into violence."),
    movie!("mov_26", "Get Out", 2017, "Horror", 7.8, "Jordan Peele", "English",
        "A young man visits his girlfriend's parents, where his simmering unease about their reception reaches a boiling point."),
    movie!("mov_27", "Oldboy", 2003, "Thriller", 8.4, "Park Chan-wook", "Korean",
        "After being kidnapped and imprisoned for fifteen years, a man is released and must find his captor in five days."),
    movie!("mov_28", "Seven Samurai", 1954, "Action", 8.6, "Akira Kurosawa", "Japanese",
        "Farmers from a village exploited by bandits hire a veteran samurai who gathers six more samurai to protect them."),
    movie!("mov_29", "Life Is Beautiful", 1997, "Comedy", 8.6, "Roberto Benigni", "Italian",
        "A Jewish waiter uses humor and imagination to shield his son from the horrors of a concentration camp during the war."),
    movie!("mov_30", "The Intouchables", 2011, "Comedy", 8.5, "Olivier Nakache", "French",
        "After a paragliding accident, a wealthy aristocrat hires a young man from the projects to be his caregiver."),
    movie!("mov_31", "Cinema Paradiso", 1988, "Drama", 8.5, "Giuseppe Tornatore", "Italian",
        "A filmmaker recalls his childhood, when he fell in love with the pictures at the cinema of his home village."),
    movie!("mov_32", "Das Boot", 1981, "War", 8.4, "Wolfgang Petersen", "German",
        "A U-boat crew endures the claustrophobic tension of submarine warfare during the Second World War."),
    movie!("mov_33", "The Lives of Others", 2006, "Drama", 8.4, "Florian Henckel von Donnersmarck", "German",
        "In 1984 East Berlin, a secret police agent conducting surveillance on a writer becomes absorbed in his life."),
    movie!("mov_34", "Django Unchained", 2012, "Western", 8.5, "Quentin Tarantino", "English",
        "With the help of a bounty hunter, a freed slave sets out to rescue his wife from a brutal plantation owner."),
    movie!("mov_35", "Inglourious Basterds", 2009, "War", 8.4, "Quentin Tarantino", "English",
        "In occupied France during the war, a plan to assassinate enemy leaders coincides with a theatre owner's vengeance."),
    movie!("mov_36", "Kill Bill: Vol. 1", 2003, "Action", 8.2, "Quentin Tarantino", "English",
        "After awakening from a four-year coma, a former assassin wreaks vengeance on the team who betrayed her."),
    movie!("mov_37", "Mad Max: Fury Road", 2015, "Action", 8.1, "George Miller", "English",
        "In a post-apocalyptic wasteland, a woman rebels against a tyrannical ruler in search of her homeland."),
    movie!("mov_38", "Toy Story", 1995, "Animation", 8.3, "John Lasseter", "English",
        "A cowboy doll is profoundly threatened when a new spaceman action figure supplants him as top toy in a boy's bedroom."),
    movie!("mov_39", "Up", 2009, "Animation", 8.3, "Pete Docter", "English",
        "A widowed balloon salesman ties thousands of balloons to his house to fly to South America, honoring his late wife's love of adventure."),
    movie!("mov_40", "The Grand Budapest Hotel", 2014, "Comedy", 8.1, "Wes Anderson", "English",
        "A legendary concierge at a famous European hotel and his lobby boy become involved in the theft of a priceless painting."),
    movie!("mov_41", "Whiplash", 2014, "Drama", 8.5, "Damien Chazelle", "English",
        "A promising young drummer enrolls at a cut-throat music conservatory where his dreams are pushed by a ruthless instructor."),
    movie!("mov_42", "The Silence of the Lambs", 1991, "Thriller", 8.6, "Jonathan Demme", "English",
        "A young FBI cadet must receive the help of an incarcerated cannibal killer to catch another serial killer."),
    movie!("mov_43", "Se7en", 1995, "Thriller", 8.6, "David Fincher", "English",
        "Two detectives hunt a serial killer who uses the seven deadly sins as his motives."),
    movie!("mov_44", "Fight Club", 1999, "Drama", 8.8, "David Fincher", "English",
        "An insomniac office worker and a soap maker form an underground fight club that evolves into something much more."),
    movie!("mov_45", "Roma", 2018, "Drama", 7.7, "Alfonso Cuarón", "Spanish",
        "A year in the life of a middle-class family's housekeeper in Mexico City in the early 1970s."),
    movie!("mov_46", "Crouching Tiger, Hidden Dragon", 2000, "Action", 7.9, "Ang Lee", "Mandarin",
        "A young warrior steals a legendary sword from a famed swordsman and escapes into a world of romantic adventure."),
    movie!("mov_47", "Your Name", 2016, "Animation", 8.4, "Makoto Shinkai", "Japanese",
        "Two strangers find themselves linked in a bizarre way and, when a connection forms, fall in love across time."),
    movie!("mov_48", "Terminator 2: Judgment Day", 1991, "Sci-Fi", 8.6, "James Cameron", "English",
        "A cyborg robot, identical to the one who failed to kill Sarah Connor, must now protect her son from a more advanced robot."),
    movie!("mov_49", "3 Idiots", 2009, "Comedy", 8.4, "Rajkumar Hirani", "Hindi",
        "Two friends search for their long-lost companion while revisiting the college days of the friend who taught them to think differently."),
    movie!("mov_50", "Everything Everywhere All at Once", 2022, "Sci-Fi", 7.8, "Daniel Kwan", "English",
        "A middle-aged immigrant is swept up in an insane adventure where she alone can save existence by exploring other universes."),
];

pub fn movies() -> &'static [Movie] {
    &MOVIES
}

pub fn movie(id: &str) -> Option<&'static Movie> {
    MOVIES.iter().find(|m| m.id == id)
}

/// A synthetic filming location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub id: &'static str,
    pub title: &'static str,
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("title".into(), json!(self.title));
        metadata.insert("location".into(), json!({ "lat": self.lat, "lon": self.lon }));
        metadata
    }
}

/// Centre of Paris.
pub const PARIS: (f64, f64) = (48.8566, 2.3522);

pub const LOCATIONS: [Location; 7] = [
    Location { id: "geo_01", title: "Inception (Paris)", lat: 48.8566, lon: 2.3522 },
    Location { id: "geo_02", title: "Amélie (Montmartre)", lat: 48.8867, lon: 2.3431 },
    Location { id: "geo_03", title: "The Dark Knight (Chicago)", lat: 41.8781, lon: -87.6298 },
    Location { id: "geo_04", title: "Lost in Translation (Tokyo)", lat: 35.6762, lon: 139.6503 },
    Location { id: "geo_05", title: "Gladiator (Rome)", lat: 41.9028, lon: 12.4964 },
    Location { id: "geo_06", title: "Slumdog Millionaire (Mumbai)", lat: 19.0760, lon: 72.8777 },
    Location { id: "geo_07", title: "Midnight in Paris (Paris)", lat: 48.8606, lon: 2.3376 },
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique_and_ordered() {
        let ids: HashSet<&str> = MOVIES.iter().map(|m| m.id).collect();
        assert_eq!(ids.len(), MOVIES.len());
        assert_eq!(MOVIES[0].id, "mov_01");
        assert_eq!(MOVIES[49].id, "mov_50");
    }

    #[test]
    fn metadata_carries_every_field() {
        let m = movie("mov_05").unwrap().metadata();
        assert_eq!(m["title"], json!("The Shawshank Redemption"));
        assert_eq!(m["year"], json!(1994));
        assert_eq!(m.len(), 7);
    }

    #[test]
    fn enough_sci_fi_for_two_pages() {
        assert!(MOVIES.iter().filter(|m| m.genre == "Sci-Fi").count() > 5);
    }

    #[test]
    fn keywords_used_by_text_scenario_exist() {
        for keyword in ["robot", "war", "love"] {
            assert!(MOVIES.iter().any(|m| m.description.contains(keyword)), "{keyword}");
        }
    }
}
